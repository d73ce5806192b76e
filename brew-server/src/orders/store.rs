//! Order store
//!
//! 订单与明细的持久化、状态流转、订单状态推导。
//! 每个写操作是一个工作单元：订单写入、原料消耗、告警评估同进同退。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{ItemCategory, Order, OrderDetail, OrderStatus};
use shared::request::CreateOrderRequest;
use shared::util::now_millis;
use shared::{AppError, AppResult, ErrorCode};
use validator::Validate;

use super::status::derive_aggregate;
use crate::core::ConsumptionPolicy;
use crate::db::{NewOrder, NewOrderItem, OrderRepo, Storage, StorageTx};
use crate::inventory::{ConsumptionOutcome, InventoryLedger};
use crate::message::NotificationBus;
use crate::utils::money;

/// 自动生成订单号的前缀
const ORDER_NUM_PREFIX: &str = "BRW";
/// 日序号起点
const ORDER_NUM_BASE: i64 = 10_000;
/// 订单号冲突时的最大重试次数
const ORDER_NUM_ATTEMPTS: i64 = 1_000;

/// 订单号：`BRW{yyyymmdd}{10000+n}`
pub fn format_order_num(day: DateTime<Utc>, n: i64) -> String {
    format!(
        "{ORDER_NUM_PREFIX}{}{}",
        day.format("%Y%m%d"),
        ORDER_NUM_BASE + n
    )
}

/// 当日 UTC 零点（毫秒）
fn start_of_day_millis(now: DateTime<Utc>) -> i64 {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

pub(crate) fn order_not_found(order_id: i64) -> AppError {
    AppError::with_message(
        ErrorCode::OrderNotFound,
        format!("Order {order_id} not found"),
    )
}

/// 一次状态流转的结果
#[derive(Debug, Clone)]
pub struct Transition {
    pub previous: OrderStatus,
    pub aggregate: OrderStatus,
    /// 本次流转触发的原料消耗（仅 on_complete 策略）
    pub consumption: Option<ConsumptionOutcome>,
}

#[derive(Clone)]
pub struct OrderStore {
    storage: Arc<dyn Storage>,
    ledger: InventoryLedger,
    bus: NotificationBus,
    policy: ConsumptionPolicy,
    default_device_id: String,
    category_devices: BTreeMap<ItemCategory, String>,
}

impl OrderStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        ledger: InventoryLedger,
        bus: NotificationBus,
        policy: ConsumptionPolicy,
        default_device_id: impl Into<String>,
        category_devices: BTreeMap<ItemCategory, String>,
    ) -> Self {
        Self {
            storage,
            ledger,
            bus,
            policy,
            default_device_id: default_device_id.into(),
            category_devices,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn policy(&self) -> ConsumptionPolicy {
        self.policy
    }

    /// 未指定设备时按首个明细分类路由，找不到映射则用兜底设备
    fn derive_device(&self, req: &CreateOrderRequest) -> String {
        let requested = req
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(device_id) = requested {
            return device_id.to_string();
        }
        req.items
            .iter()
            .find_map(|item| self.category_devices.get(&item.goods_type))
            .cloned()
            .unwrap_or_else(|| self.default_device_id.clone())
    }

    async fn next_order_num(tx: &mut dyn StorageTx, now: DateTime<Utc>) -> AppResult<String> {
        let issued = tx.count_orders_since(start_of_day_millis(now)).await?;
        for n in (issued + 1)..=(issued + ORDER_NUM_ATTEMPTS) {
            let candidate = format_order_num(now, n);
            if tx.find_order_by_num(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(AppError::internal("Unable to allocate an order number"))
    }

    /// Create an order with its items
    ///
    /// 订单号重复时拒绝；on_create 策略下同一工作单元内完成原料消耗。
    pub async fn create_order(&self, req: CreateOrderRequest) -> AppResult<OrderDetail> {
        if req.items.is_empty() {
            return Err(AppError::new(ErrorCode::OrderEmpty));
        }
        req.validate()?;
        if !req.total_price.is_finite() || req.items.iter().any(|i| !i.price.is_finite()) {
            return Err(AppError::validation("Prices must be finite numbers"));
        }

        let items_total: Decimal = req
            .items
            .iter()
            .map(|i| money::line_total(i.price, i.quantity))
            .sum();
        let declared = money::to_decimal(req.total_price);
        if money::differs(items_total, declared) {
            tracing::warn!(
                declared = %declared,
                computed = %items_total,
                "Order total does not match item totals"
            );
        }

        let device_id = self.derive_device(&req);
        let status = req.status.unwrap_or(OrderStatus::Queuing);
        let now_dt = Utc::now();
        let now = now_dt.timestamp_millis();

        let mut tx = self.storage.begin().await?;
        let order_num = match req.order_num.as_deref().map(str::trim) {
            Some(num) if !num.is_empty() => {
                if tx.find_order_by_num(num).await?.is_some() {
                    return Err(AppError::with_message(
                        ErrorCode::OrderNumberExists,
                        format!("Order number {num} already exists"),
                    ));
                }
                num.to_string()
            }
            _ => Self::next_order_num(tx.as_mut(), now_dt).await?,
        };

        let order = tx
            .insert_order(NewOrder {
                order_num,
                device_id,
                status,
                total_price: money::to_f64(declared),
                items_total: money::to_f64(items_total),
                now,
            })
            .await?;

        let mut items = Vec::with_capacity(req.items.len());
        for item in &req.items {
            let inserted = tx
                .insert_order_item(NewOrderItem {
                    order_id: order.id,
                    product_id: item.goods_id,
                    product_name: item.goods_name.trim().to_string(),
                    category: item.goods_type,
                    quantity: item.quantity,
                    unit_price: money::to_f64(money::to_decimal(item.price)),
                    total_price: money::to_f64(money::line_total(item.price, item.quantity)),
                    instruction_payload: item.instruction_text(),
                    requirement_codes: item.matter_codes.trim().to_string(),
                    status,
                    now,
                })
                .await?;
            items.push(inserted);
        }

        let consumption = match self.policy {
            ConsumptionPolicy::OnCreate => {
                Some(self.ledger.consume_for_order_in(tx.as_mut(), order.id).await?)
            }
            ConsumptionPolicy::OnComplete => None,
        };
        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            order_num = %order.order_num,
            device_id = %order.device_id,
            items = items.len(),
            status = %order.status,
            "Order created"
        );
        let detail = OrderDetail { order, items };
        self.bus
            .publish("order", "created", detail.order.id, Some(&detail));
        if let Some(outcome) = &consumption {
            self.ledger.publish_consumption(detail.order.id, outcome);
        }
        Ok(detail)
    }

    /// Apply item status changes and recompute the aggregate inside a unit of work
    ///
    /// 任一流转不合法则整体拒绝；同状态重复上报不写入。
    pub async fn transition_in(
        &self,
        tx: &mut dyn StorageTx,
        order: &Order,
        updates: &[(i64, OrderStatus)],
    ) -> AppResult<Transition> {
        let now = now_millis();
        for &(item_id, next) in updates {
            let item = tx
                .find_order_item(order.id, item_id)
                .await?
                .ok_or_else(|| {
                    AppError::with_message(
                        ErrorCode::OrderItemNotFound,
                        format!("Order item {item_id} not found in order {}", order.id),
                    )
                })?;
            if !item.status.can_transition_to(next) {
                return Err(AppError::business_rule(format!(
                    "Order item {item_id} cannot move from {} to {}",
                    item.status.code(),
                    next.code()
                ))
                .with_detail("from", item.status.code())
                .with_detail("to", next.code()));
            }
            if item.status != next {
                tx.update_order_item_status(item_id, next, now).await?;
            }
        }

        let statuses: Vec<OrderStatus> = tx
            .list_order_items(order.id)
            .await?
            .iter()
            .map(|i| i.status)
            .collect();
        let aggregate = derive_aggregate(&statuses);
        if aggregate != order.status {
            tx.update_order_status(order.id, aggregate, now).await?;
        }

        let first_completion =
            aggregate == OrderStatus::Completed && order.status != OrderStatus::Completed;
        let consumption = if first_completion && self.policy == ConsumptionPolicy::OnComplete {
            Some(self.ledger.consume_for_order_in(tx, order.id).await?)
        } else {
            None
        };

        Ok(Transition {
            previous: order.status,
            aggregate,
            consumption,
        })
    }

    /// 提交后发布订单变更
    pub fn publish_transition(&self, detail: &OrderDetail, transition: &Transition) {
        self.bus
            .publish("order", "status", detail.order.id, Some(detail));
        if let Some(outcome) = &transition.consumption {
            self.ledger.publish_consumption(detail.order.id, outcome);
        }
    }

    /// Set one item's status
    pub async fn set_item_status(
        &self,
        order_id: i64,
        item_id: i64,
        status: OrderStatus,
    ) -> AppResult<OrderDetail> {
        let mut tx = self.storage.begin().await?;
        let order = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        let transition = self
            .transition_in(tx.as_mut(), &order, &[(item_id, status)])
            .await?;
        let detail = Self::detail_in(tx.as_mut(), order_id).await?;
        tx.commit().await?;

        if transition.previous != transition.aggregate {
            tracing::info!(
                order_id,
                item_id,
                item_status = %status,
                from = %transition.previous,
                to = %transition.aggregate,
                "Order status changed"
            );
        } else {
            tracing::debug!(order_id, item_id, item_status = %status, "Order item status set");
        }
        self.publish_transition(&detail, &transition);
        Ok(detail)
    }

    pub(crate) async fn detail_in(tx: &mut dyn StorageTx, order_id: i64) -> AppResult<OrderDetail> {
        let order = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        let items = tx.list_order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    pub async fn get_detail(&self, order_id: i64) -> AppResult<OrderDetail> {
        let mut tx = self.storage.begin_read().await?;
        Self::detail_in(tx.as_mut(), order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InventoryRepo, MemoryStorage};
    use crate::inventory::{AlertEngine, IngredientCatalog, IngredientResolver};
    use chrono::TimeZone;
    use serde_json::json;
    use shared::models::{InventoryItemCreate, TransactionType};

    fn store_with(policy: ConsumptionPolicy) -> OrderStore {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let bus = NotificationBus::new();
        let ledger = InventoryLedger::new(
            storage.clone(),
            IngredientResolver::new(Arc::new(IngredientCatalog::standard())),
            AlertEngine::new(storage.clone(), bus.clone()),
            bus.clone(),
        );
        let mut routes = BTreeMap::new();
        routes.insert(ItemCategory::MilkTea, "tea-01".to_string());
        OrderStore::new(storage, ledger, bus, policy, "device-01", routes)
    }

    fn request(value: serde_json::Value) -> CreateOrderRequest {
        serde_json::from_value(value).unwrap()
    }

    fn latte_order(order_num: Option<&str>) -> CreateOrderRequest {
        request(json!({
            "orderNum": order_num,
            "totalPrice": 9.0,
            "items": [{
                "goodsName": "Latte",
                "goodsType": 1,
                "quantity": 2,
                "price": 4.5,
                "jsonCodeVal": [{"BeanCode": "1"}, {"MilkCode": "1"}, {"CupCode": "3"}]
            }]
        }))
    }

    async fn seed_water(store: &OrderStore) -> i64 {
        let mut tx = store.storage().begin().await.unwrap();
        let item = tx
            .insert_inventory_item(
                &InventoryItemCreate {
                    name: "Filtered Water".into(),
                    category: "ingredient".into(),
                    unit: "ml".into(),
                    initial_stock: 0.0,
                    max_stock: 0.0,
                    min_threshold: 0.0,
                    cost_per_unit: 0.0,
                },
                0,
            )
            .await
            .unwrap();
        tx.apply_stock_delta(item.id, 10_000.0, 0).await.unwrap();
        tx.commit().await.unwrap();
        item.id
    }

    #[test]
    fn test_order_num_format() {
        let day = Utc.with_ymd_and_hms(2024, 3, 9, 15, 30, 0).unwrap();
        assert_eq!(format_order_num(day, 1), "BRW2024030910001");
        assert_eq!(
            start_of_day_millis(day),
            Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0)
                .unwrap()
                .timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_create_generates_number_and_routes_device() {
        let store = store_with(ConsumptionPolicy::OnCreate);
        let first = store.create_order(latte_order(None)).await.unwrap();
        let second = store.create_order(latte_order(None)).await.unwrap();
        assert!(first.order.order_num.starts_with("BRW"));
        assert!(first.order.order_num.ends_with("10001"));
        assert!(second.order.order_num.ends_with("10002"));
        assert_eq!(first.order.device_id, "device-01");
        assert_eq!(first.order.status, OrderStatus::Queuing);
        assert_eq!(first.items[0].total_price, 9.0);

        let tea = store
            .create_order(request(json!({
                "totalPrice": 3.0,
                "items": [{"goodsName": "Milk Tea", "goodsType": 2, "quantity": 1, "price": 3.0}]
            })))
            .await
            .unwrap();
        assert_eq!(tea.order.device_id, "tea-01");
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let store = store_with(ConsumptionPolicy::OnCreate);
        store.create_order(latte_order(Some("A-1"))).await.unwrap();
        let err = store
            .create_order(latte_order(Some("A-1")))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderNumberExists);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_mutation() {
        let store = store_with(ConsumptionPolicy::OnCreate);
        let err = store
            .create_order(request(json!({"totalPrice": 1.0, "items": []})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderEmpty);

        let err = store
            .create_order(request(json!({
                "totalPrice": 1.0,
                "items": [{"goodsName": "Tea", "goodsType": 2, "quantity": 0, "price": 1.0}]
            })))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        let mut tx = store.storage().begin().await.unwrap();
        assert_eq!(tx.count_orders_since(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transitions_and_aggregate() {
        let store = store_with(ConsumptionPolicy::OnCreate);
        let detail = store.create_order(latte_order(None)).await.unwrap();
        let order_id = detail.order.id;
        let item_id = detail.items[0].id;

        let d = store
            .set_item_status(order_id, item_id, OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(d.order.status, OrderStatus::Processing);

        let err = store
            .set_item_status(order_id, item_id, OrderStatus::Queuing)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);

        let d = store
            .set_item_status(order_id, item_id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(d.order.status, OrderStatus::Completed);

        // repeated completion is a no-op
        store
            .set_item_status(order_id, item_id, OrderStatus::Completed)
            .await
            .unwrap();
        let err = store
            .set_item_status(order_id, item_id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);

        let err = store
            .set_item_status(order_id, 999, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderItemNotFound);
        let err = store
            .set_item_status(999, item_id, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderNotFound);
    }

    #[tokio::test]
    async fn test_on_complete_policy_consumes_once_at_completion() {
        let store = store_with(ConsumptionPolicy::OnComplete);
        let water = seed_water(&store).await;
        let detail = store.create_order(latte_order(None)).await.unwrap();
        let (order_id, item_id) = (detail.order.id, detail.items[0].id);

        let mut tx = store.storage().begin().await.unwrap();
        assert!(tx.list_transactions_by_reference(order_id).await.unwrap().is_empty());
        drop(tx);

        store
            .set_item_status(order_id, item_id, OrderStatus::Completed)
            .await
            .unwrap();
        store
            .set_item_status(order_id, item_id, OrderStatus::Completed)
            .await
            .unwrap();

        let mut tx = store.storage().begin().await.unwrap();
        let txs = tx.list_transactions_by_reference(order_id).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::OrderConsumption);
        assert_eq!(txs[0].item_id, water);
        assert_eq!(txs[0].quantity, 160.0);
    }
}
