//! Device API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use shared::ApiResponse;
use shared::models::DeviceStatusSnapshot;
use shared::request::{
    DeviceOrderQueueListRequest, EditDeviceOrderStatusRequest, OrderQueueRequest,
    SaveDeviceMatterRequest,
};
use shared::response::DeviceOrderView;
use validator::Validate;

use crate::api::{ApiJson, AppResult, ok};
use crate::core::ServerState;

/// 设备固件期望的空数据
type Empty = Vec<()>;

/// Pending work for a device
pub async fn order_queue_list(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<DeviceOrderQueueListRequest>,
) -> AppResult<Json<ApiResponse<Vec<DeviceOrderView>>>> {
    req.validate()?;
    let orders = state.queue.list_pending_work(req.device_id.trim()).await?;
    Ok(ok(orders))
}

/// Item status report
pub async fn edit_order_status(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<EditDeviceOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    state.queue.report_status(&req).await?;
    Ok(ok(Vec::new()))
}

/// Legacy paid → queuing
pub async fn order_queue(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<OrderQueueRequest>,
) -> AppResult<Json<ApiResponse<DeviceOrderView>>> {
    let view = state.queue.queue_paid_order(&req).await?;
    Ok(ok(view))
}

/// Heartbeat ingestion
///
/// 请求体无法解析时按空心跳保存，设备侧总是收到成功。
pub async fn save_device_matter(
    State(state): State<ServerState>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let req = match serde_json::from_slice::<SaveDeviceMatterRequest>(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed heartbeat body, storing empty snapshot");
            SaveDeviceMatterRequest {
                device_id: None,
                matter_status_json: None,
                device_status_json: None,
            }
        }
    };
    state.queue.save_device_matter(req).await?;
    Ok(ok(Vec::new()))
}

pub async fn latest_snapshot(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<ApiResponse<DeviceStatusSnapshot>>> {
    let snapshot = state.queue.latest_snapshot(&device_id).await?;
    Ok(ok(snapshot))
}
