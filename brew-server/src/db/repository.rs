//! Repository traits
//!
//! 每个聚合一个 trait，由 [`super::StorageTx`] 统一实现。
//! 方法都接收 `&mut self`：调用发生在工作单元内部。

use async_trait::async_trait;
use shared::models::{
    Alert, AlertType, DeviceStatusSnapshot, IngredientRequirement, InventoryItem,
    InventoryItemCreate, InventoryTransaction, ItemCategory, Order, OrderItem, OrderStatus,
    Product, ProductCreate, SnapshotCreate, TransactionType,
};

use super::RepoResult;

// =============================================================================
// Insert payloads
// =============================================================================

/// 新订单
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_num: String,
    pub device_id: String,
    pub status: OrderStatus,
    pub total_price: f64,
    pub items_total: f64,
    pub now: i64,
}

/// 新订单明细
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub product_name: String,
    pub category: ItemCategory,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_price: f64,
    pub instruction_payload: String,
    pub requirement_codes: String,
    pub status: OrderStatus,
    pub now: i64,
}

/// 新库存流水
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub item_id: i64,
    pub transaction_type: TransactionType,
    pub quantity: f64,
    pub reference_id: Option<i64>,
    pub note: Option<String>,
    pub now: i64,
}

/// 新告警
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub item_id: i64,
    pub alert_type: AlertType,
    pub threshold_value: f64,
    pub current_value: f64,
    pub message: String,
    pub now: i64,
}

// =============================================================================
// Traits
// =============================================================================

#[async_trait]
pub trait OrderRepo: Send {
    /// Duplicate if `order_num` is taken
    async fn insert_order(&mut self, order: NewOrder) -> RepoResult<Order>;
    async fn insert_order_item(&mut self, item: NewOrderItem) -> RepoResult<OrderItem>;
    async fn find_order(&mut self, id: i64) -> RepoResult<Option<Order>>;
    async fn find_order_by_num(&mut self, order_num: &str) -> RepoResult<Option<Order>>;
    /// Items of one order, ascending by id
    async fn list_order_items(&mut self, order_id: i64) -> RepoResult<Vec<OrderItem>>;
    async fn find_order_item(&mut self, order_id: i64, item_id: i64)
    -> RepoResult<Option<OrderItem>>;
    async fn update_order_item_status(
        &mut self,
        item_id: i64,
        status: OrderStatus,
        now: i64,
    ) -> RepoResult<()>;
    async fn update_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        now: i64,
    ) -> RepoResult<()>;
    /// Orders of a device whose aggregate status is in `statuses`, ascending by id
    async fn list_orders_by_status(
        &mut self,
        device_id: &str,
        statuses: &[OrderStatus],
    ) -> RepoResult<Vec<Order>>;
    async fn count_orders_since(&mut self, since: i64) -> RepoResult<i64>;
    /// 占用消耗标记；已被占用时返回 false
    async fn claim_consumption(&mut self, order_id: i64, now: i64) -> RepoResult<bool>;
}

#[async_trait]
pub trait InventoryRepo: Send {
    /// New item starts at zero stock
    async fn insert_inventory_item(
        &mut self,
        data: &InventoryItemCreate,
        now: i64,
    ) -> RepoResult<InventoryItem>;
    async fn find_inventory_item(&mut self, id: i64) -> RepoResult<Option<InventoryItem>>;
    async fn find_inventory_item_by_name(
        &mut self,
        name: &str,
    ) -> RepoResult<Option<InventoryItem>>;
    /// Ascending by name
    async fn list_inventory_items(&mut self) -> RepoResult<Vec<InventoryItem>>;
    async fn insert_transaction(&mut self, tx: NewTransaction)
    -> RepoResult<InventoryTransaction>;
    /// Add `delta` to the cached stock and return the new value
    async fn apply_stock_delta(&mut self, item_id: i64, delta: f64, now: i64) -> RepoResult<f64>;
    /// Newest first
    async fn list_transactions(
        &mut self,
        item_id: i64,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<InventoryTransaction>>;
    async fn list_transactions_by_reference(
        &mut self,
        reference_id: i64,
    ) -> RepoResult<Vec<InventoryTransaction>>;
    /// Signed replay of every transaction of the item
    async fn replay_stock(&mut self, item_id: i64) -> RepoResult<f64>;
}

#[async_trait]
pub trait AlertRepo: Send {
    async fn find_open_alert(
        &mut self,
        item_id: i64,
        alert_type: AlertType,
    ) -> RepoResult<Option<Alert>>;
    async fn insert_alert(&mut self, alert: NewAlert) -> RepoResult<Alert>;
    async fn update_alert_observation(
        &mut self,
        id: i64,
        threshold_value: f64,
        current_value: f64,
        message: &str,
        now: i64,
    ) -> RepoResult<Alert>;
    async fn find_alert(&mut self, id: i64) -> RepoResult<Option<Alert>>;
    async fn list_alerts(&mut self, include_resolved: bool) -> RepoResult<Vec<Alert>>;
    /// Returns false when the alert was already resolved
    async fn resolve_alert(&mut self, id: i64, now: i64) -> RepoResult<bool>;
    async fn resolve_all_alerts(&mut self, item_id: Option<i64>, now: i64) -> RepoResult<u64>;
}

#[async_trait]
pub trait DeviceRepo: Send {
    async fn insert_snapshot(
        &mut self,
        snapshot: SnapshotCreate,
        now: i64,
    ) -> RepoResult<DeviceStatusSnapshot>;
    async fn latest_snapshot(&mut self, device_id: &str)
    -> RepoResult<Option<DeviceStatusSnapshot>>;
}

#[async_trait]
pub trait ProductRepo: Send {
    async fn insert_product(&mut self, data: &ProductCreate, now: i64) -> RepoResult<Product>;
    async fn find_product(&mut self, id: i64) -> RepoResult<Option<Product>>;
    /// Ascending by id
    async fn list_products(&mut self) -> RepoResult<Vec<Product>>;
    async fn find_requirement(&mut self, product_id: i64)
    -> RepoResult<Option<IngredientRequirement>>;
    async fn upsert_requirement(
        &mut self,
        product_id: i64,
        requirement: &IngredientRequirement,
        now: i64,
    ) -> RepoResult<()>;
}
