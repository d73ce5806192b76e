//! Order Model

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// 订单 / 订单明细状态
///
/// 线上编码：1 未支付，2 已支付，3 排队中，4 制作中，5 已完成，-1 已取消。
/// 入参 `0` 也视为已取消（旧设备固件使用 0）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum OrderStatus {
    Cancelled,
    Unpaid,
    Paid,
    Queuing,
    Processing,
    Completed,
}

/// 非法状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStatus(pub i32);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid order status: {}", self.0)
    }
}

impl std::error::Error for InvalidStatus {}

impl OrderStatus {
    /// 线上状态码
    pub const fn code(&self) -> i32 {
        match self {
            Self::Cancelled => -1,
            Self::Unpaid => 1,
            Self::Paid => 2,
            Self::Queuing => 3,
            Self::Processing => 4,
            Self::Completed => 5,
        }
    }

    /// 解析线上状态码，`-1` 与 `0` 都映射为已取消
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 | 0 => Some(Self::Cancelled),
            1 => Some(Self::Unpaid),
            2 => Some(Self::Paid),
            3 => Some(Self::Queuing),
            4 => Some(Self::Processing),
            5 => Some(Self::Completed),
            _ => None,
        }
    }

    /// 状态显示名 (statusName)
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cancelled => "已取消",
            Self::Unpaid => "未支付",
            Self::Paid => "已支付",
            Self::Queuing => "排队中",
            Self::Processing => "制作中",
            Self::Completed => "已完成",
        }
    }

    /// 终态：已完成 / 已取消
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// 设备待处理状态：排队中 / 制作中
    pub const fn is_pending_work(&self) -> bool {
        matches!(self, Self::Queuing | Self::Processing)
    }

    /// 前进序号，已取消不在序列上
    const fn rank(&self) -> Option<u8> {
        match self {
            Self::Cancelled => None,
            Self::Unpaid => Some(1),
            Self::Paid => Some(2),
            Self::Queuing => Some(3),
            Self::Processing => Some(4),
            Self::Completed => Some(5),
        }
    }

    /// 明细状态只能前进；取消可从任意非终态进入；同状态重复上报视为无操作
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<OrderStatus> for i32 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for OrderStatus {
    type Error = InvalidStatus;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or(InvalidStatus(value))
    }
}

// ============================================================================
// Item Category
// ============================================================================

/// 饮品粗分类，设备按此将明细拆成四个队列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ItemCategory {
    /// 咖啡
    Coffee,
    /// 奶茶
    MilkTea,
    /// 果茶
    FruitTea,
    /// 其他（热水、小料等）
    Other,
}

/// 非法分类编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCategory(pub u8);

impl fmt::Display for InvalidCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item category: {}", self.0)
    }
}

impl std::error::Error for InvalidCategory {}

impl ItemCategory {
    pub const ALL: [ItemCategory; 4] = [
        ItemCategory::Coffee,
        ItemCategory::MilkTea,
        ItemCategory::FruitTea,
        ItemCategory::Other,
    ];

    pub const fn code(&self) -> u8 {
        match self {
            Self::Coffee => 1,
            Self::MilkTea => 2,
            Self::FruitTea => 3,
            Self::Other => 4,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Coffee),
            2 => Some(Self::MilkTea),
            3 => Some(Self::FruitTea),
            4 => Some(Self::Other),
            _ => None,
        }
    }
}

impl From<ItemCategory> for u8 {
    fn from(category: ItemCategory) -> Self {
        category.code()
    }
}

impl TryFrom<u8> for ItemCategory {
    type Error = InvalidCategory;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or(InvalidCategory(value))
    }
}

// ============================================================================
// Entities
// ============================================================================

/// 订单
///
/// `status` 为派生值，只由明细状态推导写入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// 对外订单号（唯一）
    pub order_num: String,
    pub device_id: String,
    pub status: OrderStatus,
    /// 下单方提交的总价
    pub total_price: f64,
    /// 明细小计之和（服务端计算）
    pub items_total: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 订单明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    /// 商品目录引用
    pub product_id: Option<i64>,
    pub product_name: String,
    pub category: ItemCategory,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_price: f64,
    /// 制作指令（原样下发给设备的 JSON 文本）
    pub instruction_payload: String,
    /// 逗号分隔的原料编码，仅用于目录可售判断
    pub requirement_codes: String,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 订单详情（含明细）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDetail {
    pub fn item(&self, item_id: i64) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(OrderStatus::from_code(-1), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_code(0), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_code(4), Some(OrderStatus::Processing));
        assert_eq!(OrderStatus::from_code(6), None);
        assert_eq!(OrderStatus::Cancelled.code(), -1);
    }

    #[test]
    fn test_status_serializes_as_code() {
        assert_eq!(serde_json::to_string(&OrderStatus::Queuing).unwrap(), "3");
        let parsed: OrderStatus = serde_json::from_str("0").unwrap();
        assert_eq!(parsed, OrderStatus::Cancelled);
        assert!(serde_json::from_str::<OrderStatus>("9").is_err());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        use OrderStatus::*;
        assert!(Queuing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Queuing.can_transition_to(Completed));
        assert!(Paid.can_transition_to(Queuing));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        use OrderStatus::*;
        assert!(!Processing.can_transition_to(Queuing));
        assert!(!Queuing.can_transition_to(Unpaid));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Cancelled.can_transition_to(Queuing));
    }

    #[test]
    fn test_cancel_from_non_terminal_only() {
        use OrderStatus::*;
        for from in [Unpaid, Paid, Queuing, Processing] {
            assert!(from.can_transition_to(Cancelled), "{from:?} -> Cancelled");
        }
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_same_status_is_noop() {
        use OrderStatus::*;
        assert!(Completed.can_transition_to(Completed));
        assert!(Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_category_codes() {
        for c in ItemCategory::ALL {
            assert_eq!(ItemCategory::from_code(c.code()), Some(c));
        }
        assert!(ItemCategory::try_from(0u8).is_err());
    }
}
