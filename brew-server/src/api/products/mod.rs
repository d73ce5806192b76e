//! Product API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/products | GET | 商品列表 + 可售状态 (`source=snapshot|ledger`, `deviceId`) |
//! | /api/products | POST | 新建商品 |
//! | /api/products/{id}/requirements | PUT | 设置原料用量 |

mod handler;

use axum::{
    Router,
    routing::{get, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/products", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/{id}/requirements", put(handler::set_requirements))
}
