//! Ingredient catalog
//!
//! 静态原料表：原料编码（需求串与设备心跳使用）、制作指令中的编码、
//! 对应的库存物料名称，以及设备上报库存的阈值。
//!
//! 设备上报值按填充比例理解：布尔型上报归一为 0 / 1，
//! 小于等于 `critical_level` 视为缺料，小于等于 `low_level` 视为偏低。

use serde::Serialize;

/// 原料种类（与制作指令中的键对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientKind {
    /// `BeanCode`
    Bean,
    /// `MilkCode`
    Milk,
    /// `CupCode`
    Cup,
    /// 隐含，每杯都需要
    Water,
}

impl IngredientKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bean => "bean",
            Self::Milk => "milk",
            Self::Cup => "cup",
            Self::Water => "water",
        }
    }
}

/// 设备上报库存的分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    Normal,
    Low,
    Critical,
}

/// 原料表条目
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    /// 原料编码，如 `bean_1`
    pub code: &'static str,
    pub kind: IngredientKind,
    /// 制作指令中的编码，水没有
    pub instruction_code: Option<&'static str>,
    /// 库存物料名称
    pub inventory_name: &'static str,
    pub unit: &'static str,
    pub low_level: f64,
    pub critical_level: f64,
}

impl CatalogEntry {
    pub fn classify(&self, value: f64) -> StockLevel {
        classify(value, self.low_level, self.critical_level)
    }
}

fn classify(value: f64, low: f64, critical: f64) -> StockLevel {
    if value <= critical {
        StockLevel::Critical
    } else if value <= low {
        StockLevel::Low
    } else {
        StockLevel::Normal
    }
}

const STANDARD_ENTRIES: &[CatalogEntry] = &[
    CatalogEntry {
        code: "bean_1",
        kind: IngredientKind::Bean,
        instruction_code: Some("1"),
        inventory_name: "Coffee Beans Type 1",
        unit: "g",
        low_level: 0.2,
        critical_level: 0.05,
    },
    CatalogEntry {
        code: "bean_2",
        kind: IngredientKind::Bean,
        instruction_code: Some("2"),
        inventory_name: "Coffee Beans Type 2",
        unit: "g",
        low_level: 0.2,
        critical_level: 0.05,
    },
    CatalogEntry {
        code: "milk_1",
        kind: IngredientKind::Milk,
        instruction_code: Some("1"),
        inventory_name: "Whole Milk",
        unit: "ml",
        low_level: 0.2,
        critical_level: 0.05,
    },
    CatalogEntry {
        code: "milk_2",
        kind: IngredientKind::Milk,
        instruction_code: Some("2"),
        inventory_name: "Oat Milk",
        unit: "ml",
        low_level: 0.2,
        critical_level: 0.05,
    },
    CatalogEntry {
        code: "cup_8oz",
        kind: IngredientKind::Cup,
        instruction_code: Some("1"),
        inventory_name: "8oz Cup",
        unit: "pcs",
        low_level: 0.1,
        critical_level: 0.0,
    },
    CatalogEntry {
        code: "cup_10oz",
        kind: IngredientKind::Cup,
        instruction_code: Some("2"),
        inventory_name: "10oz Cup",
        unit: "pcs",
        low_level: 0.1,
        critical_level: 0.0,
    },
    CatalogEntry {
        code: "cup_12oz",
        kind: IngredientKind::Cup,
        instruction_code: Some("3"),
        inventory_name: "12oz Cup",
        unit: "pcs",
        low_level: 0.1,
        critical_level: 0.0,
    },
    CatalogEntry {
        code: "cup_16oz",
        kind: IngredientKind::Cup,
        instruction_code: Some("4"),
        inventory_name: "16oz Cup",
        unit: "pcs",
        low_level: 0.1,
        critical_level: 0.0,
    },
    CatalogEntry {
        code: "water",
        kind: IngredientKind::Water,
        instruction_code: None,
        inventory_name: "Filtered Water",
        unit: "ml",
        low_level: 0.25,
        critical_level: 0.1,
    },
];

/// 原料表
#[derive(Debug, Clone)]
pub struct IngredientCatalog {
    entries: Vec<CatalogEntry>,
}

impl IngredientCatalog {
    /// 机器出厂原料表
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_ENTRIES.to_vec(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    /// 按制作指令编码查找；水忽略编码
    pub fn by_instruction(&self, kind: IngredientKind, code: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| {
            e.kind == kind
                && (kind == IngredientKind::Water || e.instruction_code == Some(code))
        })
    }

    /// 表外编码使用 0 阈值（只有完全缺料才算不可用）
    pub fn classify(&self, code: &str, value: f64) -> StockLevel {
        match self.get(code) {
            Some(entry) => entry.classify(value),
            None => classify(value, 0.0, 0.0),
        }
    }
}

impl Default for IngredientCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
