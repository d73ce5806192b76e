//! Product Model

use super::order::ItemCategory;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 商品（最小目录，仅服务于原料配置与可售判断）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: ItemCategory,
    pub price: f64,
    /// 逗号分隔的原料编码
    pub requirement_codes: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreate {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub category: ItemCategory,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub requirement_codes: String,
}

/// 商品原料用量配置，缺省字段走兜底表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IngredientRequirement {
    #[validate(range(min = 0.0))]
    pub bean_grams: Option<f64>,
    #[validate(range(min = 0.0))]
    pub milk_ml: Option<f64>,
    #[validate(range(min = 0.0))]
    pub cup_count: Option<f64>,
    #[validate(range(min = 0.0))]
    pub water_ml: Option<f64>,
}

/// 可售判断结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub missing: Vec<String>,
    pub reason: Option<String>,
}

impl Availability {
    pub fn available() -> Self {
        Self {
            available: true,
            missing: Vec::new(),
            reason: None,
        }
    }
}

/// 商品 + 可售状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAvailability {
    #[serde(flatten)]
    pub product: Product,
    pub requirement: Option<IngredientRequirement>,
    pub availability: Availability,
}
