//! Order API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/order/createOrder | POST | 下单 (旧路径，管理端使用) |
//! | /api/orders/{id} | GET | 订单详情 |
//! | /api/orders/{id}/consumption | GET | 订单原料消耗流水 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/order/createOrder", post(handler::create_order))
        .nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/consumption", get(handler::consumption))
}
