//! Stock views
//!
//! 库存有两种来源：设备心跳上报的原料标志（填充比例），和库存账本的数值库存。
//! 可售判断只依赖 [`StockView`]，两种来源各有一个适配器。

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use shared::models::{DeviceStatusSnapshot, InventoryItem};
use thiserror::Error;

use super::catalog::{IngredientCatalog, StockLevel};

/// 原料编码 → 库存分级
pub trait StockView: Send + Sync {
    /// None 表示该来源没有这个原料的读数
    fn level(&self, code: &str) -> Option<StockLevel>;

    /// 来源完全没有数据（可售判断按放行处理）
    fn is_empty(&self) -> bool;
}

// =============================================================================
// Snapshot adapter
// =============================================================================

/// 设备快照视图
#[derive(Debug, Clone, Default)]
pub struct SnapshotStockView {
    levels: BTreeMap<String, StockLevel>,
}

impl SnapshotStockView {
    pub fn new(catalog: &IngredientCatalog, snapshot: Option<&DeviceStatusSnapshot>) -> Self {
        let levels = snapshot
            .map(|s| {
                s.ingredients
                    .iter()
                    .map(|(code, value)| (code.clone(), catalog.classify(code, *value)))
                    .collect()
            })
            .unwrap_or_default();
        Self { levels }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl StockView for SnapshotStockView {
    fn level(&self, code: &str) -> Option<StockLevel> {
        self.levels.get(code).copied()
    }

    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// =============================================================================
// Ledger adapter
// =============================================================================

/// 账本视图：原料编码 → 库存物料名 → 当前库存 vs 最低阈值
#[derive(Debug, Clone, Default)]
pub struct LedgerStockView {
    levels: HashMap<String, StockLevel>,
}

impl LedgerStockView {
    pub fn new(catalog: &IngredientCatalog, items: &[InventoryItem]) -> Self {
        let by_name: HashMap<&str, &InventoryItem> =
            items.iter().map(|i| (i.name.as_str(), i)).collect();

        let levels = catalog
            .entries()
            .iter()
            .filter_map(|entry| {
                let item = by_name.get(entry.inventory_name)?;
                Some((entry.code.to_string(), ledger_level(item)))
            })
            .collect();
        Self { levels }
    }
}

/// ≤ 0 缺料，≤ 最低阈值偏低
pub fn ledger_level(item: &InventoryItem) -> StockLevel {
    if item.current_stock <= 0.0 {
        StockLevel::Critical
    } else if item.current_stock <= item.min_threshold {
        StockLevel::Low
    } else {
        StockLevel::Normal
    }
}

impl StockView for LedgerStockView {
    fn level(&self, code: &str) -> Option<StockLevel> {
        self.levels.get(code).copied()
    }

    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// =============================================================================
// Heartbeat parsing
// =============================================================================

#[derive(Debug, Error)]
pub enum SnapshotFormatError {
    #[error("embedded JSON string is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an object or a list of records, got {0}")]
    Shape(&'static str),
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 字符串里包着的 JSON 先解开一层
fn unwrap_embedded(raw: &Value) -> Result<Value, SnapshotFormatError> {
    match raw {
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => Ok(serde_json::from_str(s)?),
        other => Ok(other.clone()),
    }
}

/// 上报值 → 填充比例 `[0, 1]`
///
/// 布尔与 `"true"/"false"` 归一为 1 / 0；大于 1 的数按百分比理解。
pub fn normalize_flag(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => 1.0,
            "false" => 0.0,
            other => other.parse::<f64>().ok()?,
        },
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    let ratio = if number > 1.0 { number / 100.0 } else { number };
    Some(ratio.clamp(0.0, 1.0))
}

/// Parse `matterStatusJson`
///
/// 两种形式：`{"bean_1": 1, "milk_1": 0}`，
/// 或 `[{"matterCode": "bean_1", "status": 1}, ...]`（`code` / `value` 同义）。
/// 无法识别的单条记录被跳过。
pub fn parse_stock_flags(raw: &Value) -> Result<BTreeMap<String, f64>, SnapshotFormatError> {
    let mut flags = BTreeMap::new();
    match unwrap_embedded(raw)? {
        Value::Null => {}
        Value::Object(map) => {
            for (code, value) in &map {
                if let Some(ratio) = normalize_flag(value) {
                    flags.insert(code.trim().to_string(), ratio);
                }
            }
        }
        Value::Array(records) => {
            for record in &records {
                let code = record
                    .get("code")
                    .or_else(|| record.get("matterCode"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|c| !c.is_empty());
                let value = record.get("status").or_else(|| record.get("value"));
                if let (Some(code), Some(ratio)) = (code, value.and_then(normalize_flag)) {
                    flags.insert(code.to_string(), ratio);
                }
            }
        }
        other => return Err(SnapshotFormatError::Shape(kind_name(&other))),
    }
    Ok(flags)
}

/// Parse `deviceStatusJson` (subsystem health flags, kept verbatim)
pub fn parse_health_flags(
    raw: &Value,
) -> Result<BTreeMap<String, Value>, SnapshotFormatError> {
    match unwrap_embedded(raw)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(SnapshotFormatError::Shape(kind_name(&other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(ingredients: &[(&str, f64)]) -> DeviceStatusSnapshot {
        DeviceStatusSnapshot {
            id: 1,
            device_id: "device-01".into(),
            ingredients: ingredients
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            health: BTreeMap::new(),
            created_at: 0,
        }
    }

    fn inventory(name: &str, stock: f64, min_threshold: f64) -> InventoryItem {
        InventoryItem {
            id: 1,
            name: name.into(),
            category: "ingredient".into(),
            unit: "ml".into(),
            current_stock: stock,
            max_stock: 0.0,
            min_threshold,
            cost_per_unit: 0.0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_normalize_flag() {
        assert_eq!(normalize_flag(&json!(true)), Some(1.0));
        assert_eq!(normalize_flag(&json!("0")), Some(0.0));
        assert_eq!(normalize_flag(&json!("false")), Some(0.0));
        assert_eq!(normalize_flag(&json!(50)), Some(0.5));
        assert_eq!(normalize_flag(&json!(0.25)), Some(0.25));
        assert_eq!(normalize_flag(&json!(-3)), Some(0.0));
        assert_eq!(normalize_flag(&json!("n/a")), None);
        assert_eq!(normalize_flag(&json!(null)), None);
    }

    #[test]
    fn test_parse_object_and_array_forms() {
        let flags = parse_stock_flags(&json!({"bean_1": 1, "milk_1": "0"})).unwrap();
        assert_eq!(flags.get("bean_1"), Some(&1.0));
        assert_eq!(flags.get("milk_1"), Some(&0.0));

        let flags = parse_stock_flags(&json!([
            {"matterCode": "cup_12oz", "status": 1},
            {"code": "water", "value": 0},
            {"status": 1}
        ]))
        .unwrap();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags.get("water"), Some(&0.0));
    }

    #[test]
    fn test_parse_embedded_string_and_garbage() {
        let flags = parse_stock_flags(&json!("{\"bean_2\": true}")).unwrap();
        assert_eq!(flags.get("bean_2"), Some(&1.0));

        assert!(parse_stock_flags(&json!("{oops")).is_err());
        assert!(matches!(
            parse_stock_flags(&json!(42)),
            Err(SnapshotFormatError::Shape("number"))
        ));
        assert!(parse_stock_flags(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_view_levels() {
        let catalog = IngredientCatalog::standard();
        let snap = snapshot(&[("bean_1", 1.0), ("milk_1", 0.0), ("water", 0.2)]);
        let view = SnapshotStockView::new(&catalog, Some(&snap));
        assert!(!view.is_empty());
        assert_eq!(view.level("bean_1"), Some(StockLevel::Normal));
        assert_eq!(view.level("milk_1"), Some(StockLevel::Critical));
        assert_eq!(view.level("water"), Some(StockLevel::Low));
        assert_eq!(view.level("cup_8oz"), None);

        assert!(SnapshotStockView::new(&catalog, None).is_empty());
    }

    #[test]
    fn test_ledger_view_levels() {
        let catalog = IngredientCatalog::standard();
        let items = vec![
            inventory("Whole Milk", 5000.0, 1000.0),
            inventory("Coffee Beans Type 1", 500.0, 1000.0),
            inventory("12oz Cup", 0.0, 10.0),
            inventory("Napkins", 0.0, 10.0),
        ];
        let view = LedgerStockView::new(&catalog, &items);
        assert_eq!(view.level("milk_1"), Some(StockLevel::Normal));
        assert_eq!(view.level("bean_1"), Some(StockLevel::Low));
        assert_eq!(view.level("cup_12oz"), Some(StockLevel::Critical));
        assert_eq!(view.level("milk_2"), None);
        assert!(LedgerStockView::new(&catalog, &[]).is_empty());
    }
}
