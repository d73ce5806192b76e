//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use brew_server::db::{MemoryStorage, SqliteStorage, Storage};
use brew_server::{Config, ConsumptionPolicy, ServerState};
use serde_json::json;
use shared::models::{InventoryItem, InventoryItemCreate};
use shared::request::CreateOrderRequest;

pub fn config(policy: ConsumptionPolicy) -> Config {
    let mut config = Config::for_tests();
    config.consumption_policy = policy;
    config
}

pub fn memory_state(policy: ConsumptionPolicy) -> ServerState {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    ServerState::with_storage(config(policy), storage)
}

pub async fn sqlite_state(url: &str) -> ServerState {
    let storage = SqliteStorage::connect(url).await.unwrap();
    ServerState::with_storage(config(ConsumptionPolicy::OnCreate), Arc::new(storage))
}

pub fn stock_item(name: &str, unit: &str, initial: f64, min_threshold: f64) -> InventoryItemCreate {
    InventoryItemCreate {
        name: name.into(),
        category: "ingredient".into(),
        unit: unit.into(),
        initial_stock: initial,
        max_stock: 0.0,
        min_threshold,
        cost_per_unit: 0.0,
    }
}

/// 拿铁所需的四种物料，库存充足
pub async fn seed_latte_stock(state: &ServerState) -> Vec<InventoryItem> {
    let mut items = Vec::new();
    for (name, unit, initial, min) in [
        ("Coffee Beans Type 1", "g", 1000.0, 100.0),
        ("Whole Milk", "ml", 5000.0, 1000.0),
        ("12oz Cup", "pcs", 100.0, 10.0),
        ("Filtered Water", "ml", 20000.0, 1000.0),
    ] {
        items.push(
            state
                .ledger
                .create_item(stock_item(name, unit, initial, min))
                .await
                .unwrap(),
        );
    }
    items
}

pub fn latte_request(order_num: &str, device_id: &str) -> CreateOrderRequest {
    serde_json::from_value(json!({
        "orderNum": order_num,
        "deviceId": device_id,
        "totalPrice": 4.5,
        "items": [{
            "goodsName": "Latte",
            "goodsType": 1,
            "quantity": 1,
            "price": 4.5,
            "jsonCodeVal": [
                {"BeanCode": "1"},
                {"MilkCode": "1"},
                {"CupCode": "3"},
                {"ClassCode": "12"}
            ],
            "matterCodes": "bean_1,milk_1,cup_12oz"
        }]
    }))
    .unwrap()
}

pub fn stock_of(items: &[InventoryItem], name: &str) -> f64 {
    items
        .iter()
        .find(|i| i.name == name)
        .map(|i| i.current_stock)
        .unwrap()
}
