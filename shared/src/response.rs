//! Response views
//!
//! 设备协议出参。存储模型通过显式映射函数转换为线上结构，
//! 不做运行时字段重命名。

use crate::models::{ItemCategory, OrderDetail, OrderItem, OrderStatus};
use serde::{Deserialize, Serialize};

/// 设备视角的订单明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceItemView {
    /// 明细 ID（设备回报时作为 orderGoodsId）
    pub id: i64,
    pub order_id: i64,
    pub goods_id: Option<i64>,
    pub goods_name: String,
    pub goods_type: ItemCategory,
    pub quantity: i32,
    pub price: f64,
    pub total_price: f64,
    pub status: OrderStatus,
    pub status_name: String,
    /// 制作指令原文
    pub json_code_val: String,
    pub matter_codes: String,
}

impl DeviceItemView {
    pub fn from_item(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            goods_id: item.product_id,
            goods_name: item.product_name.clone(),
            goods_type: item.category,
            quantity: item.quantity,
            price: item.unit_price,
            total_price: item.total_price,
            status: item.status,
            status_name: item.status.name().to_string(),
            json_code_val: item.instruction_payload.clone(),
            matter_codes: item.requirement_codes.clone(),
        }
    }
}

/// 设备视角的订单：明细按分类拆成四个列表，每个列表按明细 ID 升序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOrderView {
    pub id: i64,
    pub order_num: String,
    pub device_id: String,
    pub status: OrderStatus,
    pub status_name: String,
    pub total_price: f64,
    pub created_at: i64,
    pub updated_at: i64,
    pub coffee_list: Vec<DeviceItemView>,
    pub milk_tea_list: Vec<DeviceItemView>,
    pub fruit_tea_list: Vec<DeviceItemView>,
    pub other_list: Vec<DeviceItemView>,
}

impl DeviceOrderView {
    /// 完整订单（orderQueue 回包）
    pub fn from_detail(detail: &OrderDetail) -> Self {
        Self::build(detail, |_| true)
    }

    /// 轮询视图：只保留仍需制作（排队中/制作中）的明细
    pub fn pending_from_detail(detail: &OrderDetail) -> Self {
        Self::build(detail, |i| i.status.is_pending_work())
    }

    fn build(detail: &OrderDetail, keep: impl Fn(&OrderItem) -> bool) -> Self {
        let mut items: Vec<&OrderItem> = detail.items.iter().filter(|i| keep(i)).collect();
        items.sort_by_key(|i| i.id);

        let list = |category: ItemCategory| -> Vec<DeviceItemView> {
            items
                .iter()
                .filter(|i| i.category == category)
                .map(|i| DeviceItemView::from_item(i))
                .collect()
        };

        let order = &detail.order;
        Self {
            id: order.id,
            order_num: order.order_num.clone(),
            device_id: order.device_id.clone(),
            status: order.status,
            status_name: order.status.name().to_string(),
            total_price: order.total_price,
            created_at: order.created_at,
            updated_at: order.updated_at,
            coffee_list: list(ItemCategory::Coffee),
            milk_tea_list: list(ItemCategory::MilkTea),
            fruit_tea_list: list(ItemCategory::FruitTea),
            other_list: list(ItemCategory::Other),
        }
    }

    /// 全部明细（四个列表合并）
    pub fn all_items(&self) -> impl Iterator<Item = &DeviceItemView> {
        self.coffee_list
            .iter()
            .chain(&self.milk_tea_list)
            .chain(&self.fruit_tea_list)
            .chain(&self.other_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Order;

    fn item(id: i64, category: ItemCategory) -> OrderItem {
        OrderItem {
            id,
            order_id: 1,
            product_id: None,
            product_name: format!("drink-{id}"),
            category,
            quantity: 1,
            unit_price: 3.0,
            total_price: 3.0,
            instruction_payload: r#"[{"BeanCode":"1"}]"#.to_string(),
            requirement_codes: "1,5".to_string(),
            status: OrderStatus::Queuing,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_partition_and_sort() {
        let detail = OrderDetail {
            order: Order {
                id: 1,
                order_num: "BRW2026101810001".to_string(),
                device_id: "device-01".to_string(),
                status: OrderStatus::Queuing,
                total_price: 12.0,
                items_total: 12.0,
                created_at: 0,
                updated_at: 0,
            },
            items: vec![
                item(9, ItemCategory::Coffee),
                item(4, ItemCategory::MilkTea),
                item(2, ItemCategory::Coffee),
                item(7, ItemCategory::Other),
            ],
        };

        let view = DeviceOrderView::from_detail(&detail);
        let coffee: Vec<i64> = view.coffee_list.iter().map(|i| i.id).collect();
        assert_eq!(coffee, vec![2, 9]);
        assert_eq!(view.milk_tea_list.len(), 1);
        assert!(view.fruit_tea_list.is_empty());
        assert_eq!(view.all_items().count(), 4);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["statusName"], "排队中");
        assert_eq!(json["status"], 3);
        assert_eq!(json["coffeeList"][0]["jsonCodeVal"], r#"[{"BeanCode":"1"}]"#);
        assert_eq!(json["coffeeList"][0]["matterCodes"], "1,5");
    }

    #[test]
    fn test_pending_view_drops_settled_items() {
        let with_status = |id, status| OrderItem {
            status,
            ..item(id, ItemCategory::Coffee)
        };
        let detail = OrderDetail {
            order: Order {
                id: 1,
                order_num: "BRW2026101810002".to_string(),
                device_id: "device-01".to_string(),
                status: OrderStatus::Processing,
                total_price: 12.0,
                items_total: 12.0,
                created_at: 0,
                updated_at: 0,
            },
            items: vec![
                with_status(1, OrderStatus::Completed),
                with_status(2, OrderStatus::Paid),
                with_status(3, OrderStatus::Processing),
                with_status(4, OrderStatus::Cancelled),
                with_status(5, OrderStatus::Queuing),
            ],
        };

        let pending: Vec<i64> = DeviceOrderView::pending_from_detail(&detail)
            .all_items()
            .map(|i| i.id)
            .collect();
        assert_eq!(pending, vec![3, 5]);
        assert_eq!(DeviceOrderView::from_detail(&detail).all_items().count(), 5);
    }
}
