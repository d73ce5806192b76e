//! Logging Infrastructure
//!
//! Structured logging setup with support for both development and production environments.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Initialize the logger (stdout only)
pub fn init_logger(log_level: &str, json: bool) {
    let _ = init_logger_with_file(log_level, json, None);
}

/// Initialize the logger with optional daily-rolling file output
///
/// `RUST_LOG` 优先于 `log_level`。`log_dir` 存在时同时写入 `brew-server.YYYY-MM-DD`，
/// 返回的 guard 必须在进程存活期间持有，否则缓冲日志会丢失。
pub fn init_logger_with_file(
    log_level: &str,
    json: bool,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file = log_dir.filter(|dir| dir.exists()).map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "brew-server");
        tracing_appender::non_blocking(appender)
    });

    // try_init: tests may install a subscriber more than once
    match (file, json) {
        (Some((writer, guard)), true) => {
            let _ = builder
                .json()
                .with_writer(std::io::stdout.and(writer))
                .try_init();
            Some(guard)
        }
        (Some((writer, guard)), false) => {
            let _ = builder
                .with_writer(std::io::stdout.and(writer))
                .try_init();
            Some(guard)
        }
        (None, true) => {
            let _ = builder.json().try_init();
            None
        }
        (None, false) => {
            let _ = builder.try_init();
            None
        }
    }
}
