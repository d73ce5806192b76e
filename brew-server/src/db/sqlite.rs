//! SQLite storage (sqlx)
//!
//! 行结构体 (`*Row`) 只在本模块内使用，通过 `into_model()` 显式映射为共享模型。

use async_trait::async_trait;
use shared::models::{
    Alert, AlertType, DeviceStatusSnapshot, IngredientRequirement, InventoryItem,
    InventoryItemCreate, InventoryTransaction, ItemCategory, Order, OrderItem, OrderStatus,
    Product, ProductCreate, SnapshotCreate, TransactionType,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    AlertRepo, DeviceRepo, InventoryRepo, NewAlert, NewOrder, NewOrderItem, NewTransaction,
    OrderRepo, ProductRepo, RepoError, RepoResult, Storage, StorageTx,
};

/// SQLite storage backend
///
/// 写事务由 `write_lock` 串行化，避免 deferred 事务升级写锁时的 SQLITE_BUSY。
/// 只读事务不取锁，WAL 下与写事务并发。
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteStorage {
    /// Open a pool (WAL, foreign keys, busy_timeout) and run migrations
    pub async fn connect(url: &str) -> RepoResult<Self> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| RepoError::Database(format!("Invalid database url: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_millis(5000));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存库每个连接都是独立的数据库，只能保留单连接
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        tracing::info!(in_memory, "Database connection established (SQLite, busy_timeout=5000ms)");

        sqlx::migrate!("./migrations")
            .set_ignore_missing(true)
            .run(&pool)
            .await?;
        tracing::info!("Database migrations applied");

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn begin(&self) -> RepoResult<Box<dyn StorageTx>> {
        let guard = self.write_lock.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx {
            tx,
            write_guard: Some(guard),
        }))
    }

    async fn begin_read(&self) -> RepoResult<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx {
            tx,
            write_guard: None,
        }))
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

/// Unit of work over [`SqliteStorage`]
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
    write_guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl StorageTx for SqliteTx {
    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let this = *self;
        if this.write_guard.is_none() {
            return Err(super::read_only_commit());
        }
        this.tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_status(code: i64) -> RepoResult<OrderStatus> {
    i32::try_from(code)
        .ok()
        .and_then(OrderStatus::from_code)
        .ok_or_else(|| RepoError::Database(format!("invalid order status in row: {code}")))
}

fn parse_category(code: i64) -> RepoResult<ItemCategory> {
    u8::try_from(code)
        .ok()
        .and_then(ItemCategory::from_code)
        .ok_or_else(|| RepoError::Database(format!("invalid item category in row: {code}")))
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_num: String,
    device_id: String,
    status: i64,
    total_price: f64,
    items_total: f64,
    created_at: i64,
    updated_at: i64,
}

impl OrderRow {
    fn into_model(self) -> RepoResult<Order> {
        Ok(Order {
            id: self.id,
            order_num: self.order_num,
            device_id: self.device_id,
            status: parse_status(self.status)?,
            total_price: self.total_price,
            items_total: self.items_total,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: Option<i64>,
    product_name: String,
    category: i64,
    quantity: i64,
    unit_price: f64,
    total_price: f64,
    instruction_payload: String,
    requirement_codes: String,
    status: i64,
    created_at: i64,
    updated_at: i64,
}

impl OrderItemRow {
    fn into_model(self) -> RepoResult<OrderItem> {
        Ok(OrderItem {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            product_name: self.product_name,
            category: parse_category(self.category)?,
            quantity: i32::try_from(self.quantity)
                .map_err(|_| RepoError::Database(format!("quantity out of range: {}", self.quantity)))?,
            unit_price: self.unit_price,
            total_price: self.total_price,
            instruction_payload: self.instruction_payload,
            requirement_codes: self.requirement_codes,
            status: parse_status(self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryItemRow {
    id: i64,
    name: String,
    category: String,
    unit: String,
    current_stock: f64,
    max_stock: f64,
    min_threshold: f64,
    cost_per_unit: f64,
    created_at: i64,
    updated_at: i64,
}

impl InventoryItemRow {
    fn into_model(self) -> InventoryItem {
        InventoryItem {
            id: self.id,
            name: self.name,
            category: self.category,
            unit: self.unit,
            current_stock: self.current_stock,
            max_stock: self.max_stock,
            min_threshold: self.min_threshold,
            cost_per_unit: self.cost_per_unit,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    item_id: i64,
    transaction_type: String,
    quantity: f64,
    reference_id: Option<i64>,
    note: Option<String>,
    created_at: i64,
}

impl TransactionRow {
    fn into_model(self) -> RepoResult<InventoryTransaction> {
        Ok(InventoryTransaction {
            id: self.id,
            item_id: self.item_id,
            transaction_type: TransactionType::from_str(&self.transaction_type)
                .map_err(RepoError::Database)?,
            quantity: self.quantity,
            reference_id: self.reference_id,
            note: self.note,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    item_id: i64,
    alert_type: String,
    threshold_value: f64,
    current_value: f64,
    message: String,
    is_resolved: bool,
    resolved_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl AlertRow {
    fn into_model(self) -> RepoResult<Alert> {
        Ok(Alert {
            id: self.id,
            item_id: self.item_id,
            alert_type: AlertType::from_str(&self.alert_type).map_err(RepoError::Database)?,
            threshold_value: self.threshold_value,
            current_value: self.current_value,
            message: self.message,
            is_resolved: self.is_resolved,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    device_id: String,
    ingredients: String,
    health: String,
    created_at: i64,
}

impl SnapshotRow {
    fn into_model(self) -> RepoResult<DeviceStatusSnapshot> {
        Ok(DeviceStatusSnapshot {
            id: self.id,
            device_id: self.device_id,
            ingredients: serde_json::from_str(&self.ingredients)?,
            health: serde_json::from_str(&self.health)?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    category: i64,
    price: f64,
    requirement_codes: String,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
}

impl ProductRow {
    fn into_model(self) -> RepoResult<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            category: parse_category(self.category)?,
            price: self.price,
            requirement_codes: self.requirement_codes,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RequirementRow {
    bean_grams: Option<f64>,
    milk_ml: Option<f64>,
    cup_count: Option<f64>,
    water_ml: Option<f64>,
}

impl RequirementRow {
    fn into_model(self) -> IngredientRequirement {
        IngredientRequirement {
            bean_grams: self.bean_grams,
            milk_ml: self.milk_ml,
            cup_count: self.cup_count,
            water_ml: self.water_ml,
        }
    }
}

const ORDER_COLUMNS: &str =
    "id, order_num, device_id, status, total_price, items_total, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, category, quantity, unit_price, total_price, instruction_payload, requirement_codes, status, created_at, updated_at";
const INVENTORY_COLUMNS: &str = "id, name, category, unit, current_stock, max_stock, min_threshold, cost_per_unit, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, item_id, transaction_type, quantity, reference_id, note, created_at";
const ALERT_COLUMNS: &str = "id, item_id, alert_type, threshold_value, current_value, message, is_resolved, resolved_at, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
    "id, name, category, price, requirement_codes, is_active, created_at, updated_at";

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderRepo for SqliteTx {
    async fn insert_order(&mut self, order: NewOrder) -> RepoResult<Order> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (order_num, device_id, status, total_price, items_total, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING id",
        )
        .bind(&order.order_num)
        .bind(&order.device_id)
        .bind(order.status.code())
        .bind(order.total_price)
        .bind(order.items_total)
        .bind(order.now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Order {
            id,
            order_num: order.order_num,
            device_id: order.device_id,
            status: order.status,
            total_price: order.total_price,
            items_total: order.items_total,
            created_at: order.now,
            updated_at: order.now,
        })
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> RepoResult<OrderItem> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO order_item (order_id, product_id, product_name, category, quantity, unit_price, total_price, instruction_payload, requirement_codes, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11) RETURNING id",
        )
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(i64::from(item.category.code()))
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(&item.instruction_payload)
        .bind(&item.requirement_codes)
        .bind(item.status.code())
        .bind(item.now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(OrderItem {
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
        })
    }

    async fn find_order(&mut self, id: i64) -> RepoResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(OrderRow::into_model)
            .transpose()
    }

    async fn find_order_by_num(&mut self, order_num: &str) -> RepoResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_num = ?");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_num)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(OrderRow::into_model)
            .transpose()
    }

    async fn list_order_items(&mut self, order_id: i64) -> RepoResult<Vec<OrderItem>> {
        let sql = format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_item WHERE order_id = ? ORDER BY id");
        sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(OrderItemRow::into_model)
            .collect()
    }

    async fn find_order_item(
        &mut self,
        order_id: i64,
        item_id: i64,
    ) -> RepoResult<Option<OrderItem>> {
        let sql = format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_item WHERE id = ? AND order_id = ?");
        sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(item_id)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(OrderItemRow::into_model)
            .transpose()
    }

    async fn update_order_item_status(
        &mut self,
        item_id: i64,
        status: OrderStatus,
        now: i64,
    ) -> RepoResult<()> {
        let result = sqlx::query("UPDATE order_item SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.code())
            .bind(now)
            .bind(item_id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("order item {item_id}")));
        }
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        now: i64,
    ) -> RepoResult<()> {
        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.code())
            .bind(now)
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("order {order_id}")));
        }
        Ok(())
    }

    async fn list_orders_by_status(
        &mut self,
        device_id: &str,
        statuses: &[OrderStatus],
    ) -> RepoResult<Vec<Order>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE device_id = ? AND status IN ({placeholders}) ORDER BY id"
        );
        let mut query = sqlx::query_as::<_, OrderRow>(&sql).bind(device_id);
        for status in statuses {
            query = query.bind(status.code());
        }
        query
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(OrderRow::into_model)
            .collect()
    }

    async fn count_orders_since(&mut self, since: i64) -> RepoResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE created_at >= ?")
            .bind(since)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn claim_consumption(&mut self, order_id: i64, now: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO order_consumption (order_id, consumed_at) VALUES (?, ?)",
        )
        .bind(order_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Inventory
// =============================================================================

#[async_trait]
impl InventoryRepo for SqliteTx {
    async fn insert_inventory_item(
        &mut self,
        data: &InventoryItemCreate,
        now: i64,
    ) -> RepoResult<InventoryItem> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO inventory_item (name, category, unit, current_stock, max_stock, min_threshold, cost_per_unit, created_at, updated_at) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?7) RETURNING id",
        )
        .bind(&data.name)
        .bind(&data.category)
        .bind(&data.unit)
        .bind(data.max_stock)
        .bind(data.min_threshold)
        .bind(data.cost_per_unit)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(InventoryItem {
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
        })
    }

    async fn find_inventory_item(&mut self, id: i64) -> RepoResult<Option<InventoryItem>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_item WHERE id = ?");
        let row = sqlx::query_as::<_, InventoryItemRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(InventoryItemRow::into_model))
    }

    async fn find_inventory_item_by_name(
        &mut self,
        name: &str,
    ) -> RepoResult<Option<InventoryItem>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_item WHERE name = ?");
        let row = sqlx::query_as::<_, InventoryItemRow>(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(InventoryItemRow::into_model))
    }

    async fn list_inventory_items(&mut self) -> RepoResult<Vec<InventoryItem>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_item ORDER BY name");
        let rows = sqlx::query_as::<_, InventoryItemRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(InventoryItemRow::into_model).collect())
    }

    async fn insert_transaction(
        &mut self,
        tx: NewTransaction,
    ) -> RepoResult<InventoryTransaction> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO inventory_transaction (item_id, transaction_type, quantity, reference_id, note, created_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(tx.item_id)
        .bind(tx.transaction_type.as_str())
        .bind(tx.quantity)
        .bind(tx.reference_id)
        .bind(&tx.note)
        .bind(tx.now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                RepoError::NotFound(format!("inventory item {}", tx.item_id))
            }
            other => other.into(),
        })?;

        Ok(InventoryTransaction {
            id,
            item_id: tx.item_id,
            transaction_type: tx.transaction_type,
            quantity: tx.quantity,
            reference_id: tx.reference_id,
            note: tx.note,
            created_at: tx.now,
        })
    }

    async fn apply_stock_delta(&mut self, item_id: i64, delta: f64, now: i64) -> RepoResult<f64> {
        sqlx::query_scalar::<_, f64>(
            "UPDATE inventory_item SET current_stock = current_stock + ?, updated_at = ? WHERE id = ? RETURNING current_stock",
        )
        .bind(delta)
        .bind(now)
        .bind(item_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("inventory item {item_id}")))
    }

    async fn list_transactions(
        &mut self,
        item_id: i64,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<InventoryTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM inventory_transaction WHERE item_id = ? ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(item_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(TransactionRow::into_model)
            .collect()
    }

    async fn list_transactions_by_reference(
        &mut self,
        reference_id: i64,
    ) -> RepoResult<Vec<InventoryTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM inventory_transaction WHERE reference_id = ? ORDER BY id"
        );
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(reference_id)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(TransactionRow::into_model)
            .collect()
    }

    async fn replay_stock(&mut self, item_id: i64) -> RepoResult<f64> {
        // 按写入顺序在 Rust 侧累加，和缓存值的浮点累加顺序一致
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM inventory_transaction WHERE item_id = ? ORDER BY id"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(item_id)
            .fetch_all(&mut *self.tx)
            .await?;
        let mut total = 0.0;
        for row in rows {
            total += row.into_model()?.signed_quantity();
        }
        Ok(total)
    }
}

// =============================================================================
// Alerts
// =============================================================================

#[async_trait]
impl AlertRepo for SqliteTx {
    async fn find_open_alert(
        &mut self,
        item_id: i64,
        alert_type: AlertType,
    ) -> RepoResult<Option<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM inventory_alert WHERE item_id = ? AND alert_type = ? AND is_resolved = 0"
        );
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(item_id)
            .bind(alert_type.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(AlertRow::into_model)
            .transpose()
    }

    async fn insert_alert(&mut self, alert: NewAlert) -> RepoResult<Alert> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO inventory_alert (item_id, alert_type, threshold_value, current_value, message, is_resolved, resolved_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6, ?6) RETURNING id",
        )
        .bind(alert.item_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.threshold_value)
        .bind(alert.current_value)
        .bind(&alert.message)
        .bind(alert.now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Alert {
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
        })
    }

    async fn update_alert_observation(
        &mut self,
        id: i64,
        threshold_value: f64,
        current_value: f64,
        message: &str,
        now: i64,
    ) -> RepoResult<Alert> {
        let sql = format!(
            "UPDATE inventory_alert SET threshold_value = ?, current_value = ?, message = ?, updated_at = ? WHERE id = ? RETURNING {ALERT_COLUMNS}"
        );
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(threshold_value)
            .bind(current_value)
            .bind(message)
            .bind(now)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("alert {id}")))?
            .into_model()
    }

    async fn find_alert(&mut self, id: i64) -> RepoResult<Option<Alert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM inventory_alert WHERE id = ?");
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(AlertRow::into_model)
            .transpose()
    }

    async fn list_alerts(&mut self, include_resolved: bool) -> RepoResult<Vec<Alert>> {
        let sql = if include_resolved {
            format!("SELECT {ALERT_COLUMNS} FROM inventory_alert ORDER BY id")
        } else {
            format!("SELECT {ALERT_COLUMNS} FROM inventory_alert WHERE is_resolved = 0 ORDER BY id")
        };
        sqlx::query_as::<_, AlertRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(AlertRow::into_model)
            .collect()
    }

    async fn resolve_alert(&mut self, id: i64, now: i64) -> RepoResult<bool> {
        let alert = self
            .find_alert(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("alert {id}")))?;
        if alert.is_resolved {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE inventory_alert SET is_resolved = 1, resolved_at = ?1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(true)
    }

    async fn resolve_all_alerts(&mut self, item_id: Option<i64>, now: i64) -> RepoResult<u64> {
        let result = match item_id {
            Some(item_id) => {
                sqlx::query(
                    "UPDATE inventory_alert SET is_resolved = 1, resolved_at = ?1, updated_at = ?1 WHERE is_resolved = 0 AND item_id = ?2",
                )
                .bind(now)
                .bind(item_id)
                .execute(&mut *self.tx)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE inventory_alert SET is_resolved = 1, resolved_at = ?1, updated_at = ?1 WHERE is_resolved = 0",
                )
                .bind(now)
                .execute(&mut *self.tx)
                .await?
            }
        };
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Device snapshots
// =============================================================================

#[async_trait]
impl DeviceRepo for SqliteTx {
    async fn insert_snapshot(
        &mut self,
        snapshot: SnapshotCreate,
        now: i64,
    ) -> RepoResult<DeviceStatusSnapshot> {
        let ingredients = serde_json::to_string(&snapshot.ingredients)?;
        let health = serde_json::to_string(&snapshot.health)?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO device_status_snapshot (device_id, ingredients, health, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&snapshot.device_id)
        .bind(&ingredients)
        .bind(&health)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(DeviceStatusSnapshot {
            id,
            device_id: snapshot.device_id,
            ingredients: snapshot.ingredients,
            health: snapshot.health,
            created_at: now,
        })
    }

    async fn latest_snapshot(
        &mut self,
        device_id: &str,
    ) -> RepoResult<Option<DeviceStatusSnapshot>> {
        sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, device_id, ingredients, health, created_at FROM device_status_snapshot WHERE device_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(SnapshotRow::into_model)
        .transpose()
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductRepo for SqliteTx {
    async fn insert_product(&mut self, data: &ProductCreate, now: i64) -> RepoResult<Product> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO product (name, category, price, requirement_codes, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5) RETURNING id",
        )
        .bind(&data.name)
        .bind(i64::from(data.category.code()))
        .bind(data.price)
        .bind(&data.requirement_codes)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Product {
            id,
            name: data.name.clone(),
            category: data.category,
            price: data.price,
            requirement_codes: data.requirement_codes.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_product(&mut self, id: i64) -> RepoResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(ProductRow::into_model)
            .transpose()
    }

    async fn list_products(&mut self) -> RepoResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product ORDER BY id");
        sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(ProductRow::into_model)
            .collect()
    }

    async fn find_requirement(
        &mut self,
        product_id: i64,
    ) -> RepoResult<Option<IngredientRequirement>> {
        let row = sqlx::query_as::<_, RequirementRow>(
            "SELECT bean_grams, milk_ml, cup_count, water_ml FROM product_ingredient_requirement WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(RequirementRow::into_model))
    }

    async fn upsert_requirement(
        &mut self,
        product_id: i64,
        requirement: &IngredientRequirement,
        now: i64,
    ) -> RepoResult<()> {
        if self.find_product(product_id).await?.is_none() {
            return Err(RepoError::NotFound(format!("product {product_id}")));
        }
        sqlx::query(
            "INSERT INTO product_ingredient_requirement (product_id, bean_grams, milk_ml, cup_count, water_ml, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(product_id) DO UPDATE SET bean_grams = excluded.bean_grams, milk_ml = excluded.milk_ml, cup_count = excluded.cup_count, water_ml = excluded.water_ml, updated_at = excluded.updated_at",
        )
        .bind(product_id)
        .bind(requirement.bean_grams)
        .bind(requirement.milk_ml)
        .bind(requirement.cup_count)
        .bind(requirement.water_ml)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
