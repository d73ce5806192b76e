//! Availability evaluator
//!
//! 商品可售判断：需求串中的每个原料编码都必须在库存视图中有读数且高于缺料线。
//! 视图为空（设备未上报或快照过期）时全部放行。

use std::sync::Arc;

use shared::models::{
    Availability, DeviceStatusSnapshot, IngredientRequirement, Product, ProductAvailability,
    ProductCreate,
};
use shared::request::{ProductListQuery, StockSource};
use shared::util::{now_millis, split_codes};
use shared::{AppError, AppResult, ErrorCode};
use validator::Validate;

use super::catalog::{IngredientCatalog, StockLevel};
use super::stock_view::{LedgerStockView, SnapshotStockView, StockView};
use crate::db::{DeviceRepo, InventoryRepo, ProductRepo, Storage};
use crate::message::NotificationBus;

/// Evaluate one requirement string against a stock view
pub fn evaluate(requirement_codes: &str, view: &dyn StockView) -> Availability {
    let codes = split_codes(requirement_codes);
    if codes.is_empty() || view.is_empty() {
        return Availability::available();
    }

    let missing: Vec<String> = codes
        .into_iter()
        .filter(|code| matches!(view.level(code), None | Some(StockLevel::Critical)))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Availability::available()
    } else {
        Availability {
            available: false,
            reason: Some(format!("Missing ingredients: {}", missing.join(", "))),
            missing,
        }
    }
}

#[derive(Clone)]
pub struct AvailabilityEvaluator {
    storage: Arc<dyn Storage>,
    catalog: Arc<IngredientCatalog>,
    bus: NotificationBus,
    /// 0 表示快照永不过期
    snapshot_max_age_secs: u64,
    default_device_id: String,
}

impl AvailabilityEvaluator {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<IngredientCatalog>,
        bus: NotificationBus,
        snapshot_max_age_secs: u64,
        default_device_id: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            catalog,
            bus,
            snapshot_max_age_secs,
            default_device_id: default_device_id.into(),
        }
    }

    /// Availability of one product under the given view
    pub fn is_available(&self, product: &Product, view: &dyn StockView) -> Availability {
        evaluate(&product.requirement_codes, view)
    }

    fn is_stale(&self, snapshot: &DeviceStatusSnapshot, now: i64) -> bool {
        if self.snapshot_max_age_secs == 0 {
            return false;
        }
        let max_age_ms = i64::try_from(self.snapshot_max_age_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        now.saturating_sub(snapshot.created_at) > max_age_ms
    }

    /// 构造库存视图；默认设备快照，`source=ledger` 使用账本
    pub async fn stock_view(
        &self,
        source: StockSource,
        device_id: Option<&str>,
    ) -> AppResult<Box<dyn StockView>> {
        let mut tx = self.storage.begin_read().await?;
        match source {
            StockSource::Ledger => {
                let items = tx.list_inventory_items().await?;
                Ok(Box::new(LedgerStockView::new(&self.catalog, &items)))
            }
            StockSource::Snapshot => {
                let device_id = device_id.unwrap_or(&self.default_device_id);
                let snapshot = tx.latest_snapshot(device_id).await?;
                let snapshot = snapshot.filter(|s| {
                    let stale = self.is_stale(s, now_millis());
                    if stale {
                        tracing::debug!(device_id, snapshot_id = s.id, "Snapshot is stale, ignoring");
                    }
                    !stale
                });
                Ok(Box::new(SnapshotStockView::new(
                    &self.catalog,
                    snapshot.as_ref(),
                )))
            }
        }
    }

    /// 商品列表（含可售状态）
    pub async fn list_products(&self, query: &ProductListQuery) -> AppResult<Vec<ProductAvailability>> {
        let view = self
            .stock_view(query.source, query.device_id.as_deref())
            .await?;

        let mut tx = self.storage.begin_read().await?;
        let products = tx.list_products().await?;
        let mut result = Vec::with_capacity(products.len());
        for product in products {
            let requirement = tx.find_requirement(product.id).await?;
            let availability = self.is_available(&product, view.as_ref());
            result.push(ProductAvailability {
                product,
                requirement,
                availability,
            });
        }
        Ok(result)
    }

    pub async fn create_product(&self, data: ProductCreate) -> AppResult<Product> {
        data.validate()?;
        if !data.price.is_finite() {
            return Err(AppError::new(ErrorCode::ProductInvalidPrice));
        }
        for code in split_codes(&data.requirement_codes) {
            if self.catalog.get(code).is_none() {
                tracing::warn!(product = %data.name, code, "Requirement code not in ingredient catalog");
            }
        }

        let mut tx = self.storage.begin().await?;
        let product = tx
            .insert_product(&data, now_millis())
            .await
            .map_err(|e| match e {
                crate::db::RepoError::Duplicate(_) => AppError::with_message(
                    ErrorCode::ProductNameExists,
                    format!("Product '{}' already exists", data.name),
                ),
                other => other.into(),
            })?;
        tx.commit().await?;

        tracing::info!(product_id = product.id, name = %product.name, "Product created");
        self.bus.publish("product", "created", product.id, Some(&product));
        Ok(product)
    }

    /// 设置商品原料用量
    pub async fn set_requirements(
        &self,
        product_id: i64,
        requirement: IngredientRequirement,
    ) -> AppResult<IngredientRequirement> {
        requirement.validate()?;

        let mut tx = self.storage.begin().await?;
        if tx.find_product(product_id).await?.is_none() {
            return Err(AppError::with_message(
                ErrorCode::ProductNotFound,
                format!("Product {product_id} not found"),
            ));
        }
        tx.upsert_requirement(product_id, &requirement, now_millis())
            .await?;
        tx.commit().await?;

        tracing::info!(product_id, "Product ingredient requirement updated");
        self.bus
            .publish("product", "requirement", product_id, Some(&requirement));
        Ok(requirement)
    }
}
