//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 版本、实例标识、存储后端 |
//!
//! ```json
//! { "status": "ok", "version": "0.1.0", "epoch": "…", "backend": "sqlite", "uptimeSeconds": 12 }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::time::SystemTime;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// 实例启动标识，重启后变化
    epoch: String,
    backend: &'static str,
    uptime_seconds: u64,
}

// 服务器启动时间 (首次访问时记录)
static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

fn uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(SystemTime::now);
    SystemTime::now()
        .duration_since(*start)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        epoch: state.epoch.clone(),
        backend: state.backend(),
        uptime_seconds: uptime_seconds(),
    })
}
