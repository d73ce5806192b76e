//! Inventory Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// 库存物料
///
/// `current_stock` 是流水的缓存聚合值，恒等于该物料全部流水的带符号求和。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    /// 唯一名称，原料解析按名称查找（如 "Whole Milk"）
    pub name: String,
    pub category: String,
    pub unit: String,
    pub current_stock: f64,
    /// 0 表示不设上限
    pub max_stock: f64,
    pub min_threshold: f64,
    pub cost_per_unit: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create inventory item payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemCreate {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default = "default_category")]
    #[validate(length(max = 50))]
    pub category: String,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    /// 初始库存（以 top_up 流水入账）
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub initial_stock: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub max_stock: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub min_threshold: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub cost_per_unit: f64,
}

fn default_category() -> String {
    "ingredient".to_string()
}

// ============================================================================
// Transactions
// ============================================================================

/// 库存流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// 补货（+）
    TopUp,
    /// 盘点调整（+，负数数量表示盘亏）
    Adjustment,
    /// 订单消耗（−）
    OrderConsumption,
    /// 报损（−）
    Waste,
}

impl TransactionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::Adjustment => "adjustment",
            Self::OrderConsumption => "order_consumption",
            Self::Waste => "waste",
        }
    }

    /// Apply the type's sign to a recorded quantity
    pub fn signed_delta(&self, quantity: f64) -> f64 {
        match self {
            Self::TopUp | Self::Adjustment => quantity,
            Self::OrderConsumption | Self::Waste => -quantity,
        }
    }

    /// 人工录入只允许这三类，订单消耗由系统产生
    pub const fn is_manual(&self) -> bool {
        !matches!(self, Self::OrderConsumption)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_up" => Ok(Self::TopUp),
            "adjustment" => Ok(Self::Adjustment),
            "order_consumption" => Ok(Self::OrderConsumption),
            "waste" => Ok(Self::Waste),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// 库存流水（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: i64,
    pub item_id: i64,
    pub transaction_type: TransactionType,
    /// 录入数量（未带符号）
    pub quantity: f64,
    /// 关联订单 ID
    pub reference_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: i64,
}

impl InventoryTransaction {
    pub fn signed_quantity(&self) -> f64 {
        self.transaction_type.signed_delta(self.quantity)
    }
}

/// 账本核对结果：流水重放值 vs 缓存库存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAuditEntry {
    pub item_id: i64,
    pub name: String,
    pub cached_stock: f64,
    pub replayed_stock: f64,
    pub consistent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_delta() {
        assert_eq!(TransactionType::TopUp.signed_delta(10.0), 10.0);
        assert_eq!(TransactionType::Adjustment.signed_delta(-3.0), -3.0);
        assert_eq!(TransactionType::OrderConsumption.signed_delta(18.0), -18.0);
        assert_eq!(TransactionType::Waste.signed_delta(5.0), -5.0);
    }

    #[test]
    fn test_transaction_type_str() {
        for t in [
            TransactionType::TopUp,
            TransactionType::Adjustment,
            TransactionType::OrderConsumption,
            TransactionType::Waste,
        ] {
            assert_eq!(t.as_str().parse::<TransactionType>(), Ok(t));
        }
        assert!("refund".parse::<TransactionType>().is_err());
        assert_eq!(
            serde_json::to_string(&TransactionType::TopUp).unwrap(),
            "\"top_up\""
        );
    }
}
