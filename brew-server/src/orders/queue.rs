//! Device queue protocol
//!
//! 设备轮询协议：拉取待制作订单、回报明细状态、旧版 orderQueue 入队、心跳上报。
//!
//! ```text
//! device ──poll──▶ list_pending_work ──▶ [Queuing | Processing] orders
//!        ──report─▶ report_status ──▶ OrderStore::set_item_status
//!        ──heartbeat─▶ save_device_matter ──▶ device_status_snapshot
//! ```

use std::sync::Arc;

use shared::models::{DeviceStatusSnapshot, ItemCategory, OrderStatus, SnapshotCreate};
use shared::request::{
    EditDeviceOrderStatusRequest, OrderQueueRequest, SaveDeviceMatterRequest,
};
use shared::response::DeviceOrderView;
use shared::util::now_millis;
use shared::{AppError, AppResult, ErrorCode};
use validator::Validate;

use super::store::OrderStore;
use crate::db::{DeviceRepo, OrderRepo, Storage};
use crate::inventory::stock_view::{parse_health_flags, parse_stock_flags};
use crate::message::NotificationBus;

/// 设备待处理的订单状态
const PENDING_STATUSES: [OrderStatus; 2] = [OrderStatus::Queuing, OrderStatus::Processing];

#[derive(Clone)]
pub struct DeviceQueue {
    orders: OrderStore,
    storage: Arc<dyn Storage>,
    bus: NotificationBus,
    default_device_id: String,
}

impl DeviceQueue {
    pub fn new(orders: OrderStore, bus: NotificationBus, default_device_id: impl Into<String>) -> Self {
        Self {
            storage: orders.storage().clone(),
            orders,
            bus,
            default_device_id: default_device_id.into(),
        }
    }

    /// Pending orders of a device, ascending by order id
    ///
    /// 只读，设备可重复拉取（至少一次语义）。明细只含排队中/制作中。
    pub async fn list_pending_work(&self, device_id: &str) -> AppResult<Vec<DeviceOrderView>> {
        let mut tx = self.storage.begin_read().await?;
        let orders = tx.list_orders_by_status(device_id, &PENDING_STATUSES).await?;
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let detail = OrderStore::detail_in(tx.as_mut(), order.id).await?;
            views.push(DeviceOrderView::pending_from_detail(&detail));
        }
        tracing::debug!(device_id, orders = views.len(), "Device polled queue");
        Ok(views)
    }

    /// Device reports an item status
    pub async fn report_status(&self, req: &EditDeviceOrderStatusRequest) -> AppResult<()> {
        req.validate()?;
        let status = req.parsed_status().ok_or_else(|| {
            AppError::with_message(
                ErrorCode::InvalidOrderStatus,
                format!("Unknown status code {}", req.status),
            )
        })?;
        self.orders
            .set_item_status(req.order_id, req.order_goods_id, status)
            .await?;
        Ok(())
    }

    /// Legacy path: move paid items of an order into the queue
    ///
    /// `type` 为 0 时处理全部分类，否则只处理该分类的已支付明细。
    pub async fn queue_paid_order(&self, req: &OrderQueueRequest) -> AppResult<DeviceOrderView> {
        req.validate()?;
        let category = match req.category {
            0 => None,
            code => Some(ItemCategory::from_code(code).ok_or_else(|| {
                AppError::validation(format!("Unknown item type {code}"))
            })?),
        };
        let not_found = || {
            AppError::with_message(
                ErrorCode::OrderNotFound,
                format!("Order {} not found", req.order_num),
            )
        };

        let mut tx = self.storage.begin().await?;
        let order = tx
            .find_order_by_num(req.order_num.trim())
            .await?
            .ok_or_else(not_found)?;
        if let Some(device_id) = req.device_id.as_deref().filter(|d| !d.trim().is_empty())
        {
            if device_id.trim() != order.device_id {
                return Err(not_found());
            }
        }

        let updates: Vec<(i64, OrderStatus)> = tx
            .list_order_items(order.id)
            .await?
            .into_iter()
            .filter(|i| i.status == OrderStatus::Paid)
            .filter(|i| category.is_none_or(|c| i.category == c))
            .map(|i| (i.id, OrderStatus::Queuing))
            .collect();

        let transition = self
            .orders
            .transition_in(tx.as_mut(), &order, &updates)
            .await?;
        let detail = OrderStore::detail_in(tx.as_mut(), order.id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            order_num = %order.order_num,
            queued = updates.len(),
            status = %transition.aggregate,
            "Paid order queued"
        );
        self.orders.publish_transition(&detail, &transition);
        Ok(DeviceOrderView::from_detail(&detail))
    }

    /// Ingest a heartbeat
    ///
    /// 格式错误的 JSON 只记 warn，按空数据保存，设备侧总是收到成功。
    pub async fn save_device_matter(
        &self,
        req: SaveDeviceMatterRequest,
    ) -> AppResult<DeviceStatusSnapshot> {
        let device_id = req
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.default_device_id)
            .to_string();

        let ingredients = match req.matter_status_json.as_ref().map(parse_stock_flags) {
            Some(Ok(flags)) => flags,
            Some(Err(e)) => {
                tracing::warn!(device_id = %device_id, error = %e, "Malformed matterStatusJson, ignored");
                Default::default()
            }
            None => Default::default(),
        };
        let health = match req.device_status_json.as_ref().map(parse_health_flags) {
            Some(Ok(flags)) => flags,
            Some(Err(e)) => {
                tracing::warn!(device_id = %device_id, error = %e, "Malformed deviceStatusJson, ignored");
                Default::default()
            }
            None => Default::default(),
        };

        let mut tx = self.storage.begin().await?;
        let snapshot = tx
            .insert_snapshot(
                SnapshotCreate {
                    device_id,
                    ingredients,
                    health,
                },
                now_millis(),
            )
            .await?;
        tx.commit().await?;

        tracing::debug!(
            device_id = %snapshot.device_id,
            ingredients = snapshot.ingredients.len(),
            "Device heartbeat stored"
        );
        self.bus
            .publish("device_snapshot", "reported", &snapshot.device_id, Some(&snapshot));
        Ok(snapshot)
    }

    pub async fn latest_snapshot(&self, device_id: &str) -> AppResult<DeviceStatusSnapshot> {
        let mut tx = self.storage.begin_read().await?;
        tx.latest_snapshot(device_id).await?.ok_or_else(|| {
            AppError::with_message(
                ErrorCode::DeviceSnapshotNotFound,
                format!("Device {device_id} has not reported a snapshot"),
            )
        })
    }
}
