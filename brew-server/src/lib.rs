//! Brew Server - 自动饮品机后端
//!
//! # 架构概述
//!
//! - **订单** (`orders`): 订单与明细状态机、设备轮询协议
//! - **库存** (`inventory`): 原料解析、库存流水、阈值告警、可售判断
//! - **存储** (`db`): 工作单元式存储接口，SQLite 与内存两种实现
//! - **通知** (`message`): 提交后的资源变更广播
//! - **HTTP API** (`api`): 设备协议与管理接口
//!
//! # 模块结构
//!
//! ```text
//! brew-server/src/
//! ├── core/          # 配置、状态、服务器
//! ├── api/           # HTTP 路由和处理器
//! ├── db/            # 存储接口 + SQLite / 内存实现
//! ├── orders/        # 订单存储、状态推导、设备队列
//! ├── inventory/     # 原料表、解析、账本、告警、可售
//! ├── message/       # 通知总线
//! └── utils/         # 日志、金额
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod inventory;
pub mod message;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use crate::core::{Config, ConsumptionPolicy, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境：工作目录与日志
///
/// 返回文件日志的 guard，调用方需持有到进程退出。
pub fn setup_environment(
    config: &Config,
) -> std::io::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    config.ensure_work_dir_structure()?;
    let log_dir = config.log_dir();
    Ok(init_logger_with_file(
        &config.log_level,
        config.log_json,
        Some(log_dir.as_path()),
    ))
}

pub fn print_banner() {
    println!(
        r#"
    ____
   / __ )________ _      __
  / __  / ___/ _ \ | /| / /
 / /_/ / /  /  __/ |/ |/ /
/_____/_/   \___/|__/|__/
    "#
    );
}
