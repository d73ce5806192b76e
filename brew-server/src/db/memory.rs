//! In-memory storage
//!
//! 写工作单元持有写锁，`begin()` 复制一份工作副本，`commit()` 时整体替换。
//! 丢弃工作单元即丢弃副本。只读工作单元只复制已提交数据，不等写锁。

use async_trait::async_trait;
use shared::models::{
    Alert, AlertType, DeviceStatusSnapshot, IngredientRequirement, InventoryItem,
    InventoryItemCreate, InventoryTransaction, Order, OrderItem, OrderStatus, Product,
    ProductCreate, SnapshotCreate,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{
    AlertRepo, DeviceRepo, InventoryRepo, NewAlert, NewOrder, NewOrderItem, NewTransaction,
    OrderRepo, ProductRepo, RepoError, RepoResult, Storage, StorageTx,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    orders: BTreeMap<i64, Order>,
    order_items: BTreeMap<i64, OrderItem>,
    consumed: BTreeSet<i64>,
    inventory_items: BTreeMap<i64, InventoryItem>,
    transactions: BTreeMap<i64, InventoryTransaction>,
    alerts: BTreeMap<i64, Alert>,
    snapshots: BTreeMap<i64, DeviceStatusSnapshot>,
    products: BTreeMap<i64, Product>,
    requirements: BTreeMap<i64, IngredientRequirement>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory storage backend
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    /// 已提交的数据
    tables: Arc<RwLock<Tables>>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> RepoResult<Box<dyn StorageTx>> {
        let guard = self.write_lock.clone().lock_owned().await;
        let working = self.tables.read().await.clone();
        Ok(Box::new(MemoryTx {
            write: Some((guard, self.tables.clone())),
            working,
        }))
    }

    async fn begin_read(&self) -> RepoResult<Box<dyn StorageTx>> {
        let working = self.tables.read().await.clone();
        Ok(Box::new(MemoryTx {
            write: None,
            working,
        }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Unit of work over [`MemoryStorage`]
pub struct MemoryTx {
    /// 只读工作单元为 None
    write: Option<(OwnedMutexGuard<()>, Arc<RwLock<Tables>>)>,
    working: Tables,
}

#[async_trait]
impl StorageTx for MemoryTx {
    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let MemoryTx { write, working } = *self;
        let (_guard, tables) = write.ok_or_else(super::read_only_commit)?;
        *tables.write().await = working;
        Ok(())
    }
}

#[async_trait]
impl OrderRepo for MemoryTx {
    async fn insert_order(&mut self, order: NewOrder) -> RepoResult<Order> {
        let t = &mut self.working;
        if t.orders.values().any(|o| o.order_num == order.order_num) {
            return Err(RepoError::Duplicate(format!(
                "order_num {} already exists",
                order.order_num
            )));
        }
        let id = t.next_id();
        let row = Order {
            id,
            order_num: order.order_num,
            device_id: order.device_id,
            status: order.status,
            total_price: order.total_price,
            items_total: order.items_total,
            created_at: order.now,
            updated_at: order.now,
        };
        t.orders.insert(id, row.clone());
        Ok(row)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> RepoResult<OrderItem> {
        let t = &mut self.working;
        if !t.orders.contains_key(&item.order_id) {
            return Err(RepoError::NotFound(format!("order {}", item.order_id)));
        }
        let id = t.next_id();
        let row = OrderItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            product_name: item.product_name,
            category: item.category,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            instruction_payload: item.instruction_payload,
            requirement_codes: item.requirement_codes,
            status: item.status,
            created_at: item.now,
            updated_at: item.now,
        };
        t.order_items.insert(id, row.clone());
        Ok(row)
    }

    async fn find_order(&mut self, id: i64) -> RepoResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn find_order_by_num(&mut self, order_num: &str) -> RepoResult<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.order_num == order_num)
            .cloned())
    }

    async fn list_order_items(&mut self, order_id: i64) -> RepoResult<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_order_item(
        &mut self,
        order_id: i64,
        item_id: i64,
    ) -> RepoResult<Option<OrderItem>> {
        Ok(self
            .working
            .order_items
            .get(&item_id)
            .filter(|i| i.order_id == order_id)
            .cloned())
    }

    async fn update_order_item_status(
        &mut self,
        item_id: i64,
        status: OrderStatus,
        now: i64,
    ) -> RepoResult<()> {
        let item = self
            .working
            .order_items
            .get_mut(&item_id)
            .ok_or_else(|| RepoError::NotFound(format!("order item {item_id}")))?;
        item.status = status;
        item.updated_at = now;
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        now: i64,
    ) -> RepoResult<()> {
        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RepoError::NotFound(format!("order {order_id}")))?;
        order.status = status;
        order.updated_at = now;
        Ok(())
    }

    async fn list_orders_by_status(
        &mut self,
        device_id: &str,
        statuses: &[OrderStatus],
    ) -> RepoResult<Vec<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.device_id == device_id && statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn count_orders_since(&mut self, since: i64) -> RepoResult<i64> {
        let count = self
            .working
            .orders
            .values()
            .filter(|o| o.created_at >= since)
            .count();
        Ok(count as i64)
    }

    async fn claim_consumption(&mut self, order_id: i64, _now: i64) -> RepoResult<bool> {
        Ok(self.working.consumed.insert(order_id))
    }
}

#[async_trait]
impl InventoryRepo for MemoryTx {
    async fn insert_inventory_item(
        &mut self,
        data: &InventoryItemCreate,
        now: i64,
    ) -> RepoResult<InventoryItem> {
        let t = &mut self.working;
        if t.inventory_items.values().any(|i| i.name == data.name) {
            return Err(RepoError::Duplicate(format!(
                "inventory item {} already exists",
                data.name
            )));
        }
        let id = t.next_id();
        let row = InventoryItem {
            id,
            name: data.name.clone(),
            category: data.category.clone(),
            unit: data.unit.clone(),
            current_stock: 0.0,
            max_stock: data.max_stock,
            min_threshold: data.min_threshold,
            cost_per_unit: data.cost_per_unit,
            created_at: now,
            updated_at: now,
        };
        t.inventory_items.insert(id, row.clone());
        Ok(row)
    }

    async fn find_inventory_item(&mut self, id: i64) -> RepoResult<Option<InventoryItem>> {
        Ok(self.working.inventory_items.get(&id).cloned())
    }

    async fn find_inventory_item_by_name(
        &mut self,
        name: &str,
    ) -> RepoResult<Option<InventoryItem>> {
        Ok(self
            .working
            .inventory_items
            .values()
            .find(|i| i.name == name)
            .cloned())
    }

    async fn list_inventory_items(&mut self) -> RepoResult<Vec<InventoryItem>> {
        let mut items: Vec<InventoryItem> =
            self.working.inventory_items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn insert_transaction(
        &mut self,
        tx: NewTransaction,
    ) -> RepoResult<InventoryTransaction> {
        let t = &mut self.working;
        if !t.inventory_items.contains_key(&tx.item_id) {
            return Err(RepoError::NotFound(format!("inventory item {}", tx.item_id)));
        }
        let id = t.next_id();
        let row = InventoryTransaction {
            id,
            item_id: tx.item_id,
            transaction_type: tx.transaction_type,
            quantity: tx.quantity,
            reference_id: tx.reference_id,
            note: tx.note,
            created_at: tx.now,
        };
        t.transactions.insert(id, row.clone());
        Ok(row)
    }

    async fn apply_stock_delta(&mut self, item_id: i64, delta: f64, now: i64) -> RepoResult<f64> {
        let item = self
            .working
            .inventory_items
            .get_mut(&item_id)
            .ok_or_else(|| RepoError::NotFound(format!("inventory item {item_id}")))?;
        item.current_stock += delta;
        item.updated_at = now;
        Ok(item.current_stock)
    }

    async fn list_transactions(
        &mut self,
        item_id: i64,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<InventoryTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .rev()
            .filter(|t| t.item_id == item_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_transactions_by_reference(
        &mut self,
        reference_id: i64,
    ) -> RepoResult<Vec<InventoryTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .filter(|t| t.reference_id == Some(reference_id))
            .cloned()
            .collect())
    }

    async fn replay_stock(&mut self, item_id: i64) -> RepoResult<f64> {
        Ok(self
            .working
            .transactions
            .values()
            .filter(|t| t.item_id == item_id)
            .map(InventoryTransaction::signed_quantity)
            .sum())
    }
}

#[async_trait]
impl AlertRepo for MemoryTx {
    async fn find_open_alert(
        &mut self,
        item_id: i64,
        alert_type: AlertType,
    ) -> RepoResult<Option<Alert>> {
        Ok(self
            .working
            .alerts
            .values()
            .find(|a| a.item_id == item_id && a.alert_type == alert_type && !a.is_resolved)
            .cloned())
    }

    async fn insert_alert(&mut self, alert: NewAlert) -> RepoResult<Alert> {
        let t = &mut self.working;
        let open_exists = t.alerts.values().any(|a| {
            a.item_id == alert.item_id && a.alert_type == alert.alert_type && !a.is_resolved
        });
        if open_exists {
            return Err(RepoError::Duplicate(format!(
                "open {} alert for item {}",
                alert.alert_type, alert.item_id
            )));
        }
        let id = t.next_id();
        let row = Alert {
            id,
            item_id: alert.item_id,
            alert_type: alert.alert_type,
            threshold_value: alert.threshold_value,
            current_value: alert.current_value,
            message: alert.message,
            is_resolved: false,
            resolved_at: None,
            created_at: alert.now,
            updated_at: alert.now,
        };
        t.alerts.insert(id, row.clone());
        Ok(row)
    }

    async fn update_alert_observation(
        &mut self,
        id: i64,
        threshold_value: f64,
        current_value: f64,
        message: &str,
        now: i64,
    ) -> RepoResult<Alert> {
        let alert = self
            .working
            .alerts
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("alert {id}")))?;
        alert.threshold_value = threshold_value;
        alert.current_value = current_value;
        alert.message = message.to_string();
        alert.updated_at = now;
        Ok(alert.clone())
    }

    async fn find_alert(&mut self, id: i64) -> RepoResult<Option<Alert>> {
        Ok(self.working.alerts.get(&id).cloned())
    }

    async fn list_alerts(&mut self, include_resolved: bool) -> RepoResult<Vec<Alert>> {
        Ok(self
            .working
            .alerts
            .values()
            .filter(|a| include_resolved || !a.is_resolved)
            .cloned()
            .collect())
    }

    async fn resolve_alert(&mut self, id: i64, now: i64) -> RepoResult<bool> {
        let alert = self
            .working
            .alerts
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("alert {id}")))?;
        if alert.is_resolved {
            return Ok(false);
        }
        alert.is_resolved = true;
        alert.resolved_at = Some(now);
        alert.updated_at = now;
        Ok(true)
    }

    async fn resolve_all_alerts(&mut self, item_id: Option<i64>, now: i64) -> RepoResult<u64> {
        let mut resolved = 0;
        for alert in self.working.alerts.values_mut() {
            if alert.is_resolved || item_id.is_some_and(|id| id != alert.item_id) {
                continue;
            }
            alert.is_resolved = true;
            alert.resolved_at = Some(now);
            alert.updated_at = now;
            resolved += 1;
        }
        Ok(resolved)
    }
}

#[async_trait]
impl DeviceRepo for MemoryTx {
    async fn insert_snapshot(
        &mut self,
        snapshot: SnapshotCreate,
        now: i64,
    ) -> RepoResult<DeviceStatusSnapshot> {
        let t = &mut self.working;
        let id = t.next_id();
        let row = DeviceStatusSnapshot {
            id,
            device_id: snapshot.device_id,
            ingredients: snapshot.ingredients,
            health: snapshot.health,
            created_at: now,
        };
        t.snapshots.insert(id, row.clone());
        Ok(row)
    }

    async fn latest_snapshot(
        &mut self,
        device_id: &str,
    ) -> RepoResult<Option<DeviceStatusSnapshot>> {
        Ok(self
            .working
            .snapshots
            .values()
            .rev()
            .find(|s| s.device_id == device_id)
            .cloned())
    }
}

#[async_trait]
impl ProductRepo for MemoryTx {
    async fn insert_product(&mut self, data: &ProductCreate, now: i64) -> RepoResult<Product> {
        let t = &mut self.working;
        if t.products.values().any(|p| p.name == data.name) {
            return Err(RepoError::Duplicate(format!(
                "product {} already exists",
                data.name
            )));
        }
        let id = t.next_id();
        let row = Product {
            id,
            name: data.name.clone(),
            category: data.category,
            price: data.price,
            requirement_codes: data.requirement_codes.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.products.insert(id, row.clone());
        Ok(row)
    }

    async fn find_product(&mut self, id: i64) -> RepoResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn list_products(&mut self) -> RepoResult<Vec<Product>> {
        Ok(self.working.products.values().cloned().collect())
    }

    async fn find_requirement(
        &mut self,
        product_id: i64,
    ) -> RepoResult<Option<IngredientRequirement>> {
        Ok(self.working.requirements.get(&product_id).cloned())
    }

    async fn upsert_requirement(
        &mut self,
        product_id: i64,
        requirement: &IngredientRequirement,
        _now: i64,
    ) -> RepoResult<()> {
        if !self.working.products.contains_key(&product_id) {
            return Err(RepoError::NotFound(format!("product {product_id}")));
        }
        self.working
            .requirements
            .insert(product_id, requirement.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::ItemCategory;

    fn new_order(num: &str) -> NewOrder {
        NewOrder {
            order_num: num.to_string(),
            device_id: "device-01".to_string(),
            status: OrderStatus::Queuing,
            total_price: 10.0,
            items_total: 10.0,
            now: 1,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_tx_rolls_back() {
        let storage = MemoryStorage::new();

        let mut tx = storage.begin().await.unwrap();
        tx.insert_order(new_order("A")).await.unwrap();
        drop(tx);

        let mut tx = storage.begin().await.unwrap();
        assert!(tx.find_order_by_num("A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let storage = MemoryStorage::new();

        let mut tx = storage.begin().await.unwrap();
        let order = tx.insert_order(new_order("A")).await.unwrap();
        tx.insert_order_item(NewOrderItem {
            order_id: order.id,
            product_id: None,
            product_name: "Latte".into(),
            category: ItemCategory::Coffee,
            quantity: 1,
            unit_price: 10.0,
            total_price: 10.0,
            instruction_payload: "[]".into(),
            requirement_codes: String::new(),
            status: OrderStatus::Queuing,
            now: 1,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.list_order_items(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_does_not_wait_for_open_writer() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.insert_order(new_order("A")).await.unwrap();
        tx.commit().await.unwrap();

        let mut writer = storage.begin().await.unwrap();
        writer.insert_order(new_order("B")).await.unwrap();

        let mut reader = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            storage.begin_read(),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(reader.find_order_by_num("A").await.unwrap().is_some());
        assert!(reader.find_order_by_num("B").await.unwrap().is_none());

        reader.insert_order(new_order("C")).await.unwrap();
        assert!(matches!(
            reader.commit().await.unwrap_err(),
            RepoError::Validation(_)
        ));
        writer.commit().await.unwrap();

        let mut tx = storage.begin_read().await.unwrap();
        assert!(tx.find_order_by_num("B").await.unwrap().is_some());
        assert!(tx.find_order_by_num("C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_order_num() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.insert_order(new_order("A")).await.unwrap();
        let err = tx.insert_order(new_order("A")).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_claim_consumption_once() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        assert!(tx.claim_consumption(7, 1).await.unwrap());
        assert!(!tx.claim_consumption(7, 2).await.unwrap());
    }
}
