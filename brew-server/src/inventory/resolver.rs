//! Ingredient resolver
//!
//! 制作指令 → 库存物料 + 用量。
//!
//! 指令是单键记录的有序列表，例如
//! `[{"BeanCode":"1"},{"MilkCode":"1"},{"CupCode":"3"},{"ClassCode":"12"}]`。
//! 只关心 `BeanCode` / `MilkCode` / `CupCode`，其余键忽略；水总是隐含。

use std::sync::Arc;

use serde_json::Value;
use shared::models::{IngredientRequirement, OrderItem};
use thiserror::Error;

use super::catalog::{IngredientCatalog, IngredientKind};

/// 兜底用量表
///
/// | 原料 | 用量 |
/// |------|------|
/// | 咖啡豆 | 18 g，名称含 "double" 时 36 g |
/// | 牛奶 | flat white 120 / latte 200 / cappuccino 150 / macchiato 30 / espresso、americano 0 / 其他 150 ml |
/// | 杯子 | 1 |
/// | 水 | 80 ml |
pub mod fallback {
    pub const BEAN_GRAMS: f64 = 18.0;
    pub const DOUBLE_BEAN_GRAMS: f64 = 36.0;
    pub const MILK_ML_DEFAULT: f64 = 150.0;
    pub const CUP_COUNT: f64 = 1.0;
    pub const WATER_ML: f64 = 80.0;

    /// 名称关键字 → 牛奶用量，按顺序匹配
    pub const MILK_ML_BY_NAME: &[(&str, f64)] = &[
        ("flat white", 120.0),
        ("latte", 200.0),
        ("cappuccino", 150.0),
        ("macchiato", 30.0),
        ("espresso", 0.0),
        ("americano", 0.0),
    ];
}

#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("instruction payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("instruction payload must be a list of code records")]
    Shape,
}

/// 指令中解析出的原料编码
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionCodes {
    pub bean_code: Option<String>,
    pub milk_code: Option<String>,
    pub cup_code: Option<String>,
    pub has_water: bool,
}

/// Parse the device instruction payload
///
/// 接受 JSON 数组，或包着 JSON 数组的字符串（二次编码）。空串视为空列表。
/// 编码值可以是字符串或整数；`"0"` 与空值表示未选择。
pub fn parse_instruction_codes(payload: &str) -> Result<InstructionCodes, InstructionError> {
    let mut codes = InstructionCodes {
        has_water: true,
        ..Default::default()
    };
    if payload.trim().is_empty() {
        return Ok(codes);
    }

    let mut value: Value = serde_json::from_str(payload)?;
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)?;
    }
    let Value::Array(records) = value else {
        return Err(InstructionError::Shape);
    };

    for record in &records {
        let Some(fields) = record.as_object() else {
            continue;
        };
        for (key, raw) in fields {
            let slot = match key.as_str() {
                "BeanCode" => &mut codes.bean_code,
                "MilkCode" => &mut codes.milk_code,
                "CupCode" => &mut codes.cup_code,
                _ => continue,
            };
            *slot = normalize_code(raw);
        }
    }
    Ok(codes)
}

fn normalize_code(raw: &Value) -> Option<String> {
    let code = match raw {
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => n.to_string(),
                Err(_) => s.to_string(),
            }
        }
        Value::Number(n) => n.as_i64().map(|n| n.to_string())?,
        _ => return None,
    };
    if code.is_empty() || code == "0" {
        None
    } else {
        Some(code)
    }
}

/// 兜底用量（每杯）
pub fn fallback_quantity(kind: IngredientKind, product_name: &str) -> f64 {
    let name = product_name.to_lowercase();
    match kind {
        IngredientKind::Bean => {
            if name.contains("double") {
                fallback::DOUBLE_BEAN_GRAMS
            } else {
                fallback::BEAN_GRAMS
            }
        }
        IngredientKind::Milk => fallback::MILK_ML_BY_NAME
            .iter()
            .find(|(keyword, _)| name.contains(keyword))
            .map(|(_, ml)| *ml)
            .unwrap_or(fallback::MILK_ML_DEFAULT),
        IngredientKind::Cup => fallback::CUP_COUNT,
        IngredientKind::Water => fallback::WATER_ML,
    }
}

/// 每杯用量：商品配置优先，缺省字段走兜底表
pub fn quantity_for(
    kind: IngredientKind,
    product_name: &str,
    requirement: Option<&IngredientRequirement>,
) -> f64 {
    let configured = requirement.and_then(|r| match kind {
        IngredientKind::Bean => r.bean_grams,
        IngredientKind::Milk => r.milk_ml,
        IngredientKind::Cup => r.cup_count,
        IngredientKind::Water => r.water_ml,
    });
    configured.unwrap_or_else(|| fallback_quantity(kind, product_name))
}

/// 解析出的单个原料用量（已乘以明细数量）
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIngredient {
    pub kind: IngredientKind,
    pub inventory_name: &'static str,
    pub quantity: f64,
}

/// 一条明细的解析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub ingredients: Vec<ResolvedIngredient>,
    /// 商品没有用量配置
    pub used_fallback: bool,
}

/// 原料解析器
#[derive(Debug, Clone)]
pub struct IngredientResolver {
    catalog: Arc<IngredientCatalog>,
}

impl IngredientResolver {
    pub fn new(catalog: Arc<IngredientCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &IngredientCatalog {
        &self.catalog
    }

    /// 静态查找库存物料名，未知编码返回 None
    pub fn resolve_inventory_name(&self, kind: IngredientKind, code: &str) -> Option<&'static str> {
        self.catalog
            .by_instruction(kind, code)
            .map(|entry| entry.inventory_name)
    }

    /// Resolve one order line
    ///
    /// 未知编码与零用量被跳过；指令格式错误时返回错误，由调用方决定如何处理。
    pub fn resolve(
        &self,
        item: &OrderItem,
        requirement: Option<&IngredientRequirement>,
    ) -> Result<Resolution, InstructionError> {
        let codes = parse_instruction_codes(&item.instruction_payload)?;

        let mut wanted: Vec<(IngredientKind, String)> = Vec::with_capacity(4);
        if let Some(code) = codes.bean_code {
            wanted.push((IngredientKind::Bean, code));
        }
        if let Some(code) = codes.milk_code {
            wanted.push((IngredientKind::Milk, code));
        }
        if let Some(code) = codes.cup_code {
            wanted.push((IngredientKind::Cup, code));
        }
        if codes.has_water {
            wanted.push((IngredientKind::Water, String::new()));
        }

        let units = f64::from(item.quantity.max(0));
        let mut resolution = Resolution {
            ingredients: Vec::with_capacity(wanted.len()),
            used_fallback: requirement.is_none(),
        };

        for (kind, code) in wanted {
            let Some(inventory_name) = self.resolve_inventory_name(kind, &code) else {
                tracing::debug!(
                    kind = kind.as_str(),
                    code = %code,
                    item_id = item.id,
                    "Unknown ingredient code, skipped"
                );
                continue;
            };
            let quantity = quantity_for(kind, &item.product_name, requirement) * units;
            if quantity <= 0.0 {
                continue;
            }
            resolution.ingredients.push(ResolvedIngredient {
                kind,
                inventory_name,
                quantity,
            });
        }
        Ok(resolution)
    }
}
