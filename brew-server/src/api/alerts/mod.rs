//! Alert API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/alerts | GET | 告警列表 (默认仅未解决，`includeResolved=true` 全部) |
//! | /api/alerts/{id}/resolve | POST | 解决单条 |
//! | /api/alerts/resolve-all | POST | 批量解决 (可选 itemId) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/alerts", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/resolve-all", post(handler::resolve_all))
        .route("/{id}/resolve", post(handler::resolve))
}
