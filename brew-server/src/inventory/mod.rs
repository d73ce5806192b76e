//! Inventory engine
//!
//! - [`catalog`] - 静态原料表与设备上报阈值
//! - [`resolver`] - 制作指令 → 库存物料 + 用量
//! - [`ledger`] - 库存流水与缓存库存
//! - [`alerts`] - 阈值告警
//! - [`stock_view`] - 快照 / 账本两种库存视图
//! - [`availability`] - 商品可售判断

pub mod alerts;
pub mod availability;
pub mod catalog;
pub mod ledger;
pub mod resolver;
pub mod stock_view;

pub use alerts::AlertEngine;
pub use availability::AvailabilityEvaluator;
pub use catalog::{IngredientCatalog, IngredientKind, StockLevel};
pub use ledger::{ConsumptionOutcome, InventoryLedger};
pub use resolver::IngredientResolver;
pub use stock_view::{LedgerStockView, SnapshotStockView, StockView};
