//! Device protocol API
//!
//! 设备固件使用的轮询协议，路径与字段名保持固件约定 (camelCase)。
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/device/deviceOrderQueueList | POST | 拉取待制作订单 |
//! | /api/device/editDeviceOrderStatus | POST | 回报明细状态 |
//! | /api/device/orderQueue | POST | 已支付订单入队 |
//! | /api/device/saveDeviceMatter | POST | 心跳 (原料 + 部件状态) |
//! | /api/device/{deviceId}/snapshot | GET | 最近一次心跳 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/device", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/deviceOrderQueueList", post(handler::order_queue_list))
        .route("/editDeviceOrderStatus", post(handler::edit_order_status))
        .route("/orderQueue", post(handler::order_queue))
        .route("/saveDeviceMatter", post(handler::save_device_matter))
        .route("/{device_id}/snapshot", get(handler::latest_snapshot))
}
