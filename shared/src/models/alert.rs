//! Alert Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 库存告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    OutOfStock,
    Overstock,
}

impl AlertType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LowStock => "low_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Overstock => "overstock",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_stock" => Ok(Self::LowStock),
            "out_of_stock" => Ok(Self::OutOfStock),
            "overstock" => Ok(Self::Overstock),
            other => Err(format!("unknown alert type: {other}")),
        }
    }
}

/// 告警严重度（读取时计算，不落库）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl AlertSeverity {
    /// 1 最高
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
        }
    }
}

/// 库存告警
///
/// 同一 (item, type) 至多一条未解决告警，再次触发时原地更新。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub item_id: i64,
    pub alert_type: AlertType,
    pub threshold_value: f64,
    pub current_value: f64,
    pub message: String,
    pub is_resolved: bool,
    pub resolved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 告警列表视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    pub id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub alert_type: AlertType,
    pub threshold_value: f64,
    pub current_value: f64,
    pub message: String,
    pub severity: AlertSeverity,
    pub priority: u8,
    pub is_resolved: bool,
    pub resolved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
