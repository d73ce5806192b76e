//! Aggregate order status
//!
//! 订单状态只由明细状态推导，按顺序匹配：
//!
//! | 明细状态 | 订单状态 |
//! |----------|----------|
//! | 全部已取消 | 已完成 |
//! | 全部已完成 | 已完成 |
//! | 任一制作中 | 制作中 |
//! | 全部排队中 | 排队中 |
//! | 全部未支付 / 全部已支付 | 同明细 |
//! | 其他混合 | 制作中 |
//!
//! 已完成与已取消混合时落在"其他混合"，仍为制作中。

use shared::models::OrderStatus;

/// Derive the order status from its item statuses
pub fn derive_aggregate(items: &[OrderStatus]) -> OrderStatus {
    let all = |status: OrderStatus| items.iter().all(|s| *s == status);

    if items.is_empty() {
        return OrderStatus::Queuing;
    }
    if all(OrderStatus::Cancelled) || all(OrderStatus::Completed) {
        return OrderStatus::Completed;
    }
    if items.contains(&OrderStatus::Processing) {
        return OrderStatus::Processing;
    }
    if all(OrderStatus::Queuing) {
        return OrderStatus::Queuing;
    }
    if all(OrderStatus::Unpaid) {
        return OrderStatus::Unpaid;
    }
    if all(OrderStatus::Paid) {
        return OrderStatus::Paid;
    }
    OrderStatus::Processing
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_rule_table() {
        let cases: &[(&[OrderStatus], OrderStatus)] = &[
            (&[], Queuing),
            (&[Cancelled, Cancelled], Completed),
            (&[Completed], Completed),
            (&[Completed, Completed], Completed),
            (&[Queuing, Processing], Processing),
            (&[Processing, Completed], Processing),
            (&[Cancelled, Processing], Processing),
            (&[Queuing, Queuing], Queuing),
            (&[Queuing, Completed], Processing),
            (&[Queuing, Cancelled], Processing),
            (&[Completed, Cancelled], Processing),
            (&[Unpaid, Unpaid], Unpaid),
            (&[Paid], Paid),
            (&[Paid, Queuing], Processing),
            (&[Unpaid, Paid], Processing),
        ];
        for (items, expected) in cases {
            assert_eq!(derive_aggregate(items), *expected, "items: {items:?}");
        }
    }

    #[test]
    fn test_pure_function_of_multiset() {
        let a = [Queuing, Processing, Completed];
        let b = [Completed, Queuing, Processing];
        assert_eq!(derive_aggregate(&a), derive_aggregate(&b));
    }
}
