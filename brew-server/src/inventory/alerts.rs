//! Alert engine
//!
//! 阈值告警：缺货 / 偏低 / 超储。同一 (物料, 类型) 至多一条未解决告警，
//! 重复触发时原地更新观测值。告警不会随库存恢复自动解决，只能人工解决。

use std::collections::HashMap;
use std::sync::Arc;

use shared::models::{Alert, AlertSeverity, AlertType, AlertView, InventoryItem};
use shared::util::now_millis;
use shared::{AppError, AppResult, ErrorCode};

use crate::db::{AlertRepo, InventoryRepo, NewAlert, Storage, StorageTx};
use crate::message::NotificationBus;

/// 超储容差
const OVERSTOCK_FACTOR: f64 = 1.01;

/// 告警严重度（读取时计算）
pub fn severity(alert: &Alert) -> AlertSeverity {
    match alert.alert_type {
        AlertType::OutOfStock => AlertSeverity::Critical,
        AlertType::LowStock if alert.current_value <= alert.threshold_value * 0.5 => {
            AlertSeverity::High
        }
        AlertType::LowStock => AlertSeverity::Medium,
        AlertType::Overstock => AlertSeverity::Low,
    }
}

fn to_view(alert: Alert, item_name: String) -> AlertView {
    let severity = severity(&alert);
    AlertView {
        id: alert.id,
        item_id: alert.item_id,
        item_name,
        alert_type: alert.alert_type,
        threshold_value: alert.threshold_value,
        current_value: alert.current_value,
        message: alert.message,
        severity,
        priority: severity.priority(),
        is_resolved: alert.is_resolved,
        resolved_at: alert.resolved_at,
        created_at: alert.created_at,
        updated_at: alert.updated_at,
    }
}

/// 当前库存触发的告警：(类型, 阈值)
fn triggered(item: &InventoryItem) -> Vec<(AlertType, f64)> {
    let mut hits = Vec::with_capacity(2);
    if item.current_stock <= 0.0 {
        hits.push((AlertType::OutOfStock, item.min_threshold));
    } else if item.current_stock <= item.min_threshold {
        hits.push((AlertType::LowStock, item.min_threshold));
    }
    if item.max_stock > 0.0 && item.current_stock > item.max_stock * OVERSTOCK_FACTOR {
        hits.push((AlertType::Overstock, item.max_stock));
    }
    hits
}

fn message_for(alert_type: AlertType, item: &InventoryItem, threshold: f64) -> String {
    let stock = item.current_stock;
    let unit = &item.unit;
    match alert_type {
        AlertType::OutOfStock => format!("{} is out of stock ({stock} {unit})", item.name),
        AlertType::LowStock => format!(
            "{} is running low ({stock} {unit}, threshold {threshold} {unit})",
            item.name
        ),
        AlertType::Overstock => format!(
            "{} exceeds max stock ({stock} {unit}, max {threshold} {unit})",
            item.name
        ),
    }
}

#[derive(Clone)]
pub struct AlertEngine {
    storage: Arc<dyn Storage>,
    bus: NotificationBus,
}

impl AlertEngine {
    pub fn new(storage: Arc<dyn Storage>, bus: NotificationBus) -> Self {
        Self { storage, bus }
    }

    /// Re-evaluate thresholds for one item inside the caller's unit of work
    ///
    /// 返回本次新建或更新的告警，由调用方在提交后发布。
    pub async fn check_and_create_alerts(
        tx: &mut dyn StorageTx,
        item_id: i64,
    ) -> AppResult<Vec<Alert>> {
        let item = tx
            .find_inventory_item(item_id)
            .await?
            .ok_or_else(|| inventory_not_found(item_id))?;

        let now = now_millis();
        let mut touched = Vec::new();
        for (alert_type, threshold) in triggered(&item) {
            let message = message_for(alert_type, &item, threshold);
            let alert = match tx.find_open_alert(item_id, alert_type).await? {
                Some(open) => {
                    tx.update_alert_observation(
                        open.id,
                        threshold,
                        item.current_stock,
                        &message,
                        now,
                    )
                    .await?
                }
                None => {
                    tracing::warn!(
                        item_id,
                        item = %item.name,
                        alert_type = %alert_type,
                        stock = item.current_stock,
                        "Inventory alert raised"
                    );
                    tx.insert_alert(NewAlert {
                        item_id,
                        alert_type,
                        threshold_value: threshold,
                        current_value: item.current_stock,
                        message,
                        now,
                    })
                    .await?
                }
            };
            touched.push(alert);
        }
        Ok(touched)
    }

    /// 发布提交后的告警变更
    pub fn publish(&self, alerts: &[Alert]) {
        for alert in alerts {
            self.bus.publish("alert", "upsert", alert.id, Some(alert));
        }
    }

    /// 告警列表：按优先级升序，同优先级按更新时间倒序
    pub async fn list_alerts(&self, include_resolved: bool) -> AppResult<Vec<AlertView>> {
        let mut tx = self.storage.begin_read().await?;
        let alerts = tx.list_alerts(include_resolved).await?;
        let names: HashMap<i64, String> = tx
            .list_inventory_items()
            .await?
            .into_iter()
            .map(|i| (i.id, i.name))
            .collect();
        drop(tx);

        let mut views: Vec<AlertView> = alerts
            .into_iter()
            .map(|a| {
                let name = names.get(&a.item_id).cloned().unwrap_or_default();
                to_view(a, name)
            })
            .collect();
        views.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(views)
    }

    /// 解决单条告警；已解决的告警原样返回
    pub async fn resolve_alert(&self, id: i64) -> AppResult<Alert> {
        let mut tx = self.storage.begin().await?;
        if tx.find_alert(id).await?.is_none() {
            return Err(AppError::with_message(
                ErrorCode::AlertNotFound,
                format!("Alert {id} not found"),
            ));
        }
        let changed = tx.resolve_alert(id, now_millis()).await?;
        let alert = tx
            .find_alert(id)
            .await?
            .ok_or_else(|| AppError::internal(format!("Alert {id} vanished during resolve")))?;
        tx.commit().await?;

        if changed {
            tracing::info!(alert_id = id, item_id = alert.item_id, "Alert resolved");
            self.bus.publish("alert", "resolved", id, Some(&alert));
        }
        Ok(alert)
    }

    /// 批量解决，可限定物料；返回解决条数
    pub async fn resolve_all(&self, item_id: Option<i64>) -> AppResult<u64> {
        let mut tx = self.storage.begin().await?;
        let count = tx.resolve_all_alerts(item_id, now_millis()).await?;
        tx.commit().await?;

        if count > 0 {
            tracing::info!(count, item_id = ?item_id, "Alerts resolved in bulk");
            self.bus
                .publish("alert", "resolved_all", item_id.unwrap_or(0), Some(&count));
        }
        Ok(count)
    }
}

pub(crate) fn inventory_not_found(item_id: i64) -> AppError {
    AppError::with_message(
        ErrorCode::InventoryItemNotFound,
        format!("Inventory item {item_id} not found"),
    )
}
