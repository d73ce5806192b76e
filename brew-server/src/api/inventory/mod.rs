//! Inventory API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/inventory/items | GET / POST | 物料列表 / 新建 |
//! | /api/inventory/items/{id} | GET | 物料详情 |
//! | /api/inventory/items/{id}/transactions | GET / POST | 流水列表 / 人工入账 |
//! | /api/inventory/audit | GET | 流水重放核对 |

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/inventory", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/items", get(handler::list).post(handler::create))
        .route("/items/{id}", get(handler::get_by_id))
        .route(
            "/items/{id}/transactions",
            get(handler::list_transactions).post(handler::record_transaction),
        )
        .route("/audit", get(handler::audit))
}
