//! Money calculation utilities using rust_decimal for precision
//!
//! 内部用 `Decimal` 计算，落库/序列化前转回 `f64`。

use rust_decimal::prelude::*;

/// 2 decimal places, half-up
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Convert back to f64, rounded to 2 decimal places
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// unit_price × quantity
pub fn line_total(unit_price: f64, quantity: i32) -> Decimal {
    (to_decimal(unit_price) * Decimal::from(quantity))
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether two amounts differ by more than [`MONEY_TOLERANCE`]
pub fn differs(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() > MONEY_TOLERANCE
}
