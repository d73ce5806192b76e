//! Request types
//!
//! 设备协议与管理端的入参 DTO。字段名保持设备固件使用的 camelCase。

use crate::models::{ItemCategory, OrderStatus, TransactionType};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Pagination query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationQuery {
    /// Page number (1-based, default: 1)
    #[serde(default = "default_page")]
    pub page: u32,

    /// Items per page (default: 50, max: 500)
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

impl PaginationQuery {
    /// Get the offset for database queries
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit())
    }

    /// Get the limit (clamped to 1..=500)
    pub fn limit(&self) -> u32 {
        self.per_page.clamp(1, 500)
    }
}

// ============================================================================
// Device protocol
// ============================================================================

/// POST deviceOrderQueueList
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOrderQueueListRequest {
    #[validate(length(min = 1, max = 64))]
    pub device_id: String,
}

/// POST editDeviceOrderStatus
///
/// `status` 保留原始整数，非法值返回校验错误而不是反序列化失败。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditDeviceOrderStatusRequest {
    pub order_id: i64,
    pub order_goods_id: i64,
    #[validate(range(min = -1, max = 5))]
    pub status: i32,
}

impl EditDeviceOrderStatusRequest {
    pub fn parsed_status(&self) -> Option<OrderStatus> {
        OrderStatus::from_code(self.status)
    }
}

/// POST orderQueue（已支付 → 排队中）
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderQueueRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_num: String,
    #[serde(default)]
    pub device_id: Option<String>,
    /// 饮品分类，0 表示全部
    #[serde(default, rename = "type")]
    #[validate(range(max = 4))]
    pub category: u8,
}

/// POST saveDeviceMatter
///
/// 两个 JSON 字段既可能是对象，也可能是 JSON 文本字符串。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDeviceMatterRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub matter_status_json: Option<serde_json::Value>,
    #[serde(default)]
    pub device_status_json: Option<serde_json::Value>,
}

// ============================================================================
// Orders
// ============================================================================

/// POST createOrder
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub order_num: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub device_id: Option<String>,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub total_price: f64,
    /// 初始状态，仅允许 未支付 / 已支付 / 排队中（默认）
    #[serde(default)]
    #[validate(custom(function = "validate_initial_status"))]
    pub status: Option<OrderStatus>,
    #[validate(length(min = 1, max = 50), nested)]
    pub items: Vec<CreateOrderItem>,
}

/// 下单明细
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    #[serde(default)]
    pub goods_id: Option<i64>,
    #[validate(length(min = 1, max = 100))]
    pub goods_name: String,
    pub goods_type: ItemCategory,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
    #[validate(range(min = 0.0, max = 100_000.0))]
    pub price: f64,
    /// 制作指令：JSON 数组或其文本形式
    #[serde(default)]
    pub json_code_val: serde_json::Value,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub matter_codes: String,
}

impl CreateOrderItem {
    /// 指令以文本形式保存并原样下发
    pub fn instruction_text(&self) -> String {
        match &self.json_code_val {
            serde_json::Value::Null => "[]".to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn validate_initial_status(status: &OrderStatus) -> Result<(), ValidationError> {
    match status {
        OrderStatus::Unpaid | OrderStatus::Paid | OrderStatus::Queuing => Ok(()),
        _ => Err(ValidationError::new("initial_status")),
    }
}

// ============================================================================
// Inventory / alerts / products
// ============================================================================

/// POST /api/inventory/items/{id}/transactions
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransactionRequest {
    pub transaction_type: TransactionType,
    #[validate(range(min = -1_000_000.0, max = 1_000_000.0))]
    pub quantity: f64,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub note: Option<String>,
}

/// POST /api/alerts/resolve-all
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAllAlertsRequest {
    #[serde(default)]
    pub item_id: Option<i64>,
}

/// 可售判断使用的库存来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockSource {
    /// 设备心跳快照
    #[default]
    Snapshot,
    /// 库存账本
    Ledger,
}

/// GET /api/products
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    #[serde(default)]
    pub source: StockSource,
    #[serde(default)]
    pub device_id: Option<String>,
}
