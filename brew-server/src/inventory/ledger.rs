//! Inventory ledger
//!
//! 流水只追加；每条流水在同一工作单元内更新缓存库存并重新评估告警。
//!
//! ```text
//! record_in(tx) ─▶ insert_transaction ─▶ apply_stock_delta ─▶ check_and_create_alerts
//! ```

use std::sync::Arc;

use shared::models::{
    Alert, InventoryItem, InventoryItemCreate, InventoryTransaction, LedgerAuditEntry,
    OrderStatus, TransactionType,
};
use shared::request::{PaginationQuery, RecordTransactionRequest};
use shared::util::now_millis;
use shared::{AppError, AppResult, ErrorCode};
use validator::Validate;

use super::alerts::{AlertEngine, inventory_not_found};
use super::resolver::IngredientResolver;
use crate::db::{InventoryRepo, NewTransaction, OrderRepo, ProductRepo, Storage, StorageTx};
use crate::message::NotificationBus;

/// 重放值与缓存值的容差
const AUDIT_TOLERANCE: f64 = 1e-6;

/// 单条流水写入结果
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub transaction: InventoryTransaction,
    pub new_stock: f64,
    pub alerts: Vec<Alert>,
}

/// 订单消耗结果
#[derive(Debug, Clone, Default)]
pub struct ConsumptionOutcome {
    /// false：该订单已消耗过，本次未写任何流水
    pub claimed: bool,
    pub transactions: Vec<InventoryTransaction>,
    pub alerts: Vec<Alert>,
}

impl ConsumptionOutcome {
    fn absorb(&mut self, outcome: RecordOutcome) {
        self.transactions.push(outcome.transaction);
        for alert in outcome.alerts {
            match self.alerts.iter_mut().find(|a| a.id == alert.id) {
                Some(existing) => *existing = alert,
                None => self.alerts.push(alert),
            }
        }
    }
}

#[derive(Clone)]
pub struct InventoryLedger {
    storage: Arc<dyn Storage>,
    resolver: IngredientResolver,
    alerts: AlertEngine,
    bus: NotificationBus,
}

impl InventoryLedger {
    pub fn new(
        storage: Arc<dyn Storage>,
        resolver: IngredientResolver,
        alerts: AlertEngine,
        bus: NotificationBus,
    ) -> Self {
        Self {
            storage,
            resolver,
            alerts,
            bus,
        }
    }

    // ========== Unit-of-work building blocks ==========

    /// Append one transaction inside the caller's unit of work
    ///
    /// 不做下限截断；库存变为负数时记 warn。
    pub async fn record_in(
        tx: &mut dyn StorageTx,
        entry: NewTransaction,
    ) -> AppResult<RecordOutcome> {
        let item_id = entry.item_id;
        let now = entry.now;
        let delta = entry.transaction_type.signed_delta(entry.quantity);

        if tx.find_inventory_item(item_id).await?.is_none() {
            return Err(inventory_not_found(item_id));
        }
        let transaction = tx.insert_transaction(entry).await?;
        let new_stock = tx.apply_stock_delta(item_id, delta, now).await?;
        if new_stock < 0.0 {
            tracing::warn!(
                item_id,
                stock = new_stock,
                transaction_type = %transaction.transaction_type,
                "Inventory stock went negative"
            );
        }
        let alerts = AlertEngine::check_and_create_alerts(tx, item_id).await?;

        Ok(RecordOutcome {
            transaction,
            new_stock,
            alerts,
        })
    }

    /// Consume ingredients for every non-cancelled line of an order
    ///
    /// 通过消耗标记保证每个订单最多消耗一次；取消的明细不消耗。
    pub async fn consume_for_order_in(
        &self,
        tx: &mut dyn StorageTx,
        order_id: i64,
    ) -> AppResult<ConsumptionOutcome> {
        let now = now_millis();
        if !tx.claim_consumption(order_id, now).await? {
            tracing::debug!(order_id, "Order already consumed, skipping");
            return Ok(ConsumptionOutcome::default());
        }

        let mut outcome = ConsumptionOutcome {
            claimed: true,
            ..Default::default()
        };
        let items = tx.list_order_items(order_id).await?;
        for item in items.iter().filter(|i| i.status != OrderStatus::Cancelled) {
            let requirement = match item.product_id {
                Some(product_id) => tx.find_requirement(product_id).await?,
                None => None,
            };
            let resolution = match self.resolver.resolve(item, requirement.as_ref()) {
                Ok(resolution) => resolution,
                Err(e) => {
                    tracing::warn!(
                        order_id,
                        item_id = item.id,
                        error = %e,
                        "Malformed instruction payload, nothing consumed for item"
                    );
                    continue;
                }
            };
            if resolution.used_fallback {
                tracing::warn!(
                    order_id,
                    item_id = item.id,
                    product = %item.product_name,
                    "No ingredient configuration for product, using fallback quantities"
                );
            }

            for ingredient in resolution.ingredients {
                let Some(stock_item) = tx
                    .find_inventory_item_by_name(ingredient.inventory_name)
                    .await?
                else {
                    tracing::debug!(
                        inventory = ingredient.inventory_name,
                        "Inventory item not registered, skipped"
                    );
                    continue;
                };
                let recorded = Self::record_in(
                    tx,
                    NewTransaction {
                        item_id: stock_item.id,
                        transaction_type: TransactionType::OrderConsumption,
                        quantity: ingredient.quantity,
                        reference_id: Some(order_id),
                        note: Some(format!("{} x{}", item.product_name, item.quantity)),
                        now,
                    },
                )
                .await?;
                outcome.absorb(recorded);
            }
        }

        tracing::info!(
            order_id,
            transactions = outcome.transactions.len(),
            "Order ingredients consumed"
        );
        Ok(outcome)
    }

    /// 提交后发布流水与告警
    pub fn publish_consumption(&self, order_id: i64, outcome: &ConsumptionOutcome) {
        if !outcome.claimed {
            return;
        }
        self.bus.publish(
            "inventory",
            "consumed",
            order_id,
            Some(&outcome.transactions),
        );
        self.alerts.publish(&outcome.alerts);
    }

    // ========== Standalone operations ==========

    /// Consume for an order in its own unit of work
    pub async fn consume_for_order(&self, order_id: i64) -> AppResult<ConsumptionOutcome> {
        let mut tx = self.storage.begin().await?;
        if tx.find_order(order_id).await?.is_none() {
            return Err(AppError::with_message(
                ErrorCode::OrderNotFound,
                format!("Order {order_id} not found"),
            ));
        }
        let outcome = self.consume_for_order_in(tx.as_mut(), order_id).await?;
        tx.commit().await?;
        self.publish_consumption(order_id, &outcome);
        Ok(outcome)
    }

    /// Record a manual transaction (top_up / adjustment / waste)
    pub async fn record(
        &self,
        item_id: i64,
        req: RecordTransactionRequest,
    ) -> AppResult<RecordOutcome> {
        req.validate()?;
        validate_manual(&req)?;

        let mut tx = self.storage.begin().await?;
        let outcome = Self::record_in(
            tx.as_mut(),
            NewTransaction {
                item_id,
                transaction_type: req.transaction_type,
                quantity: req.quantity,
                reference_id: req.reference_id,
                note: req.note,
                now: now_millis(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            item_id,
            transaction_type = %outcome.transaction.transaction_type,
            quantity = outcome.transaction.quantity,
            stock = outcome.new_stock,
            "Inventory transaction recorded"
        );
        self.bus
            .publish("inventory", "transaction", item_id, Some(&outcome.transaction));
        self.alerts.publish(&outcome.alerts);
        Ok(outcome)
    }

    /// Create an inventory item; initial stock is booked as a top_up
    pub async fn create_item(&self, data: InventoryItemCreate) -> AppResult<InventoryItem> {
        data.validate()?;

        let now = now_millis();
        let mut tx = self.storage.begin().await?;
        if tx.find_inventory_item_by_name(&data.name).await?.is_some() {
            return Err(AppError::with_message(
                ErrorCode::InventoryItemExists,
                format!("Inventory item '{}' already exists", data.name),
            ));
        }
        let created = tx.insert_inventory_item(&data, now).await?;
        let mut alerts = Vec::new();
        if data.initial_stock > 0.0 {
            let outcome = Self::record_in(
                tx.as_mut(),
                NewTransaction {
                    item_id: created.id,
                    transaction_type: TransactionType::TopUp,
                    quantity: data.initial_stock,
                    reference_id: None,
                    note: Some("initial stock".into()),
                    now,
                },
            )
            .await?;
            alerts = outcome.alerts;
        }
        let item = tx
            .find_inventory_item(created.id)
            .await?
            .ok_or_else(|| inventory_not_found(created.id))?;
        tx.commit().await?;

        tracing::info!(item_id = item.id, name = %item.name, stock = item.current_stock, "Inventory item created");
        self.bus.publish("inventory", "created", item.id, Some(&item));
        self.alerts.publish(&alerts);
        Ok(item)
    }

    pub async fn list_items(&self) -> AppResult<Vec<InventoryItem>> {
        let mut tx = self.storage.begin_read().await?;
        Ok(tx.list_inventory_items().await?)
    }

    pub async fn get_item(&self, item_id: i64) -> AppResult<InventoryItem> {
        let mut tx = self.storage.begin_read().await?;
        tx.find_inventory_item(item_id)
            .await?
            .ok_or_else(|| inventory_not_found(item_id))
    }

    /// 物料流水，最新在前
    pub async fn list_transactions(
        &self,
        item_id: i64,
        page: &PaginationQuery,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let mut tx = self.storage.begin_read().await?;
        if tx.find_inventory_item(item_id).await?.is_none() {
            return Err(inventory_not_found(item_id));
        }
        Ok(tx
            .list_transactions(item_id, i64::from(page.limit()), page.offset())
            .await?)
    }

    /// 订单关联的消耗流水
    pub async fn transactions_for_order(
        &self,
        order_id: i64,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let mut tx = self.storage.begin_read().await?;
        // 手工流水也可能带 referenceId，只取订单消耗
        Ok(tx
            .list_transactions_by_reference(order_id)
            .await?
            .into_iter()
            .filter(|t| t.transaction_type == TransactionType::OrderConsumption)
            .collect())
    }

    /// Replay every item's log and compare with the cached stock
    pub async fn audit(&self) -> AppResult<Vec<LedgerAuditEntry>> {
        let mut tx = self.storage.begin_read().await?;
        let items = tx.list_inventory_items().await?;
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let replayed = tx.replay_stock(item.id).await?;
            let consistent = (replayed - item.current_stock).abs() <= AUDIT_TOLERANCE;
            if !consistent {
                tracing::error!(
                    item_id = item.id,
                    cached = item.current_stock,
                    replayed,
                    "Ledger drift detected"
                );
            }
            entries.push(LedgerAuditEntry {
                item_id: item.id,
                name: item.name,
                cached_stock: item.current_stock,
                replayed_stock: replayed,
                consistent,
            });
        }
        Ok(entries)
    }
}

fn validate_manual(req: &RecordTransactionRequest) -> AppResult<()> {
    if !req.transaction_type.is_manual() {
        return Err(AppError::with_message(
            ErrorCode::InvalidTransactionType,
            format!(
                "{} transactions are recorded by the system",
                req.transaction_type
            ),
        ));
    }
    let quantity = req.quantity;
    let valid = match req.transaction_type {
        TransactionType::Adjustment => quantity.is_finite() && quantity != 0.0,
        _ => quantity.is_finite() && quantity > 0.0,
    };
    if !valid {
        return Err(AppError::with_message(
            ErrorCode::InvalidQuantity,
            format!(
                "Invalid quantity {quantity} for {}",
                req.transaction_type
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStorage, NewOrder, NewOrderItem};
    use crate::inventory::IngredientCatalog;
    use shared::models::{AlertType, ItemCategory};

    fn ledger() -> (Arc<dyn Storage>, InventoryLedger) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let bus = NotificationBus::new();
        let ledger = InventoryLedger::new(
            storage.clone(),
            IngredientResolver::new(Arc::new(IngredientCatalog::standard())),
            AlertEngine::new(storage.clone(), bus.clone()),
            bus,
        );
        (storage, ledger)
    }

    fn stock(name: &str, unit: &str, initial: f64, min_threshold: f64) -> InventoryItemCreate {
        InventoryItemCreate {
            name: name.into(),
            category: "ingredient".into(),
            unit: unit.into(),
            initial_stock: initial,
            max_stock: 0.0,
            min_threshold,
            cost_per_unit: 0.0,
        }
    }

    fn manual(transaction_type: TransactionType, quantity: f64) -> RecordTransactionRequest {
        RecordTransactionRequest {
            transaction_type,
            quantity,
            reference_id: None,
            note: None,
        }
    }

    async fn seed_order(storage: &Arc<dyn Storage>, items: &[(&str, &str, OrderStatus)]) -> i64 {
        let mut tx = storage.begin().await.unwrap();
        let order = tx
            .insert_order(NewOrder {
                order_num: "T-1".into(),
                device_id: "device-01".into(),
                status: OrderStatus::Queuing,
                total_price: 0.0,
                items_total: 0.0,
                now: 0,
            })
            .await
            .unwrap();
        for (name, payload, status) in items {
            tx.insert_order_item(NewOrderItem {
                order_id: order.id,
                product_id: None,
                product_name: name.to_string(),
                category: ItemCategory::Coffee,
                quantity: 1,
                unit_price: 0.0,
                total_price: 0.0,
                instruction_payload: payload.to_string(),
                requirement_codes: String::new(),
                status: *status,
                now: 0,
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn test_create_item_books_initial_stock() {
        let (_, ledger) = ledger();
        let item = ledger
            .create_item(stock("Whole Milk", "ml", 5000.0, 1000.0))
            .await
            .unwrap();
        assert_eq!(item.current_stock, 5000.0);

        let txs = ledger
            .list_transactions(item.id, &PaginationQuery::default())
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::TopUp);

        let err = ledger
            .create_item(stock("Whole Milk", "ml", 0.0, 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InventoryItemExists);
    }

    #[tokio::test]
    async fn test_record_signs_and_no_floor() {
        let (_, ledger) = ledger();
        let item = ledger
            .create_item(stock("Filtered Water", "ml", 100.0, 10.0))
            .await
            .unwrap();

        let out = ledger
            .record(item.id, manual(TransactionType::Waste, 150.0))
            .await
            .unwrap();
        assert_eq!(out.new_stock, -50.0);
        assert_eq!(out.alerts[0].alert_type, AlertType::OutOfStock);

        let out = ledger
            .record(item.id, manual(TransactionType::Adjustment, -5.0))
            .await
            .unwrap();
        assert_eq!(out.new_stock, -55.0);

        let audit = ledger.audit().await.unwrap();
        assert!(audit.iter().all(|e| e.consistent));
        assert_eq!(audit[0].replayed_stock, -55.0);
    }

    #[tokio::test]
    async fn test_manual_record_rejects_system_types_and_bad_quantities() {
        let (_, ledger) = ledger();
        let item = ledger
            .create_item(stock("8oz Cup", "pcs", 10.0, 2.0))
            .await
            .unwrap();

        let err = ledger
            .record(item.id, manual(TransactionType::OrderConsumption, 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransactionType);

        let err = ledger
            .record(item.id, manual(TransactionType::TopUp, 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidQuantity);

        let err = ledger
            .record(404, manual(TransactionType::TopUp, 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InventoryItemNotFound);
    }

    #[tokio::test]
    async fn test_consumption_skips_cancelled_and_runs_once() {
        let (storage, ledger) = ledger();
        ledger
            .create_item(stock("Coffee Beans Type 1", "g", 1000.0, 100.0))
            .await
            .unwrap();
        ledger
            .create_item(stock("Filtered Water", "ml", 10000.0, 100.0))
            .await
            .unwrap();

        let order_id = seed_order(
            &storage,
            &[
                ("Espresso", r#"[{"BeanCode":"1"}]"#, OrderStatus::Queuing),
                ("Espresso", r#"[{"BeanCode":"1"}]"#, OrderStatus::Cancelled),
            ],
        )
        .await;

        let first = ledger.consume_for_order(order_id).await.unwrap();
        assert!(first.claimed);
        assert_eq!(first.transactions.len(), 2);

        let second = ledger.consume_for_order(order_id).await.unwrap();
        assert!(!second.claimed);
        assert!(second.transactions.is_empty());

        let beans = ledger.list_items().await.unwrap();
        let beans = beans
            .iter()
            .find(|i| i.name == "Coffee Beans Type 1")
            .unwrap();
        assert_eq!(beans.current_stock, 982.0);
        assert_eq!(
            ledger.transactions_for_order(order_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_order_consumption_ignores_manual_rows_with_same_reference() {
        let (storage, ledger) = ledger();
        let beans = ledger
            .create_item(stock("Coffee Beans Type 1", "g", 1000.0, 100.0))
            .await
            .unwrap();
        ledger
            .create_item(stock("Filtered Water", "ml", 10000.0, 100.0))
            .await
            .unwrap();
        let order_id = seed_order(
            &storage,
            &[("Espresso", r#"[{"BeanCode":"1"}]"#, OrderStatus::Queuing)],
        )
        .await;
        ledger.consume_for_order(order_id).await.unwrap();

        let mut waste = manual(TransactionType::Waste, 5.0);
        waste.reference_id = Some(order_id);
        ledger.record(beans.id, waste).await.unwrap();

        let consumed = ledger.transactions_for_order(order_id).await.unwrap();
        assert_eq!(consumed.len(), 2);
        assert!(
            consumed
                .iter()
                .all(|t| t.transaction_type == TransactionType::OrderConsumption)
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_consumes_nothing() {
        let (storage, ledger) = ledger();
        ledger
            .create_item(stock("Filtered Water", "ml", 1000.0, 100.0))
            .await
            .unwrap();
        let order_id =
            seed_order(&storage, &[("Latte", "{broken", OrderStatus::Queuing)]).await;

        let outcome = ledger.consume_for_order(order_id).await.unwrap();
        assert!(outcome.claimed);
        assert!(outcome.transactions.is_empty());
    }
}
