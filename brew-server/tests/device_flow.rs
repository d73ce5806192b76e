//! End-to-end flows against the in-memory backend

mod common;

use brew_server::ConsumptionPolicy;
use brew_server::db::{OrderRepo, StorageTx};
use common::*;
use shared::ErrorCode;
use shared::models::{AlertType, OrderStatus, TransactionType};
use shared::request::{EditDeviceOrderStatusRequest, OrderQueueRequest, RecordTransactionRequest};

#[tokio::test]
async fn latte_creation_books_four_consumption_transactions() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    seed_latte_stock(&state).await;

    let detail = state
        .orders
        .create_order(latte_request("A-100", "device-01"))
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::Queuing);

    let mut consumed = state
        .ledger
        .transactions_for_order(detail.order.id)
        .await
        .unwrap();
    consumed.sort_by_key(|t| t.id);
    let quantities: Vec<f64> = consumed.iter().map(|t| t.quantity).collect();
    assert_eq!(quantities, vec![18.0, 200.0, 1.0, 80.0]);
    assert!(
        consumed
            .iter()
            .all(|t| t.transaction_type == TransactionType::OrderConsumption)
    );

    let items = state.ledger.list_items().await.unwrap();
    assert_eq!(stock_of(&items, "Coffee Beans Type 1"), 982.0);
    assert_eq!(stock_of(&items, "Whole Milk"), 4800.0);
    assert_eq!(stock_of(&items, "12oz Cup"), 99.0);
    assert_eq!(stock_of(&items, "Filtered Water"), 19920.0);
}

#[tokio::test]
async fn device_poll_and_report_walks_the_aggregate() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let detail = state
        .orders
        .create_order(latte_request("B-1", "device-07"))
        .await
        .unwrap();
    let order_id = detail.order.id;
    let item_id = detail.items[0].id;

    let polled = state.queue.list_pending_work("device-07").await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].status, OrderStatus::Queuing);
    assert_eq!(polled[0].coffee_list[0].id, item_id);
    assert!(polled[0].milk_tea_list.is_empty());

    let report = |status: i32| EditDeviceOrderStatusRequest {
        order_id,
        order_goods_id: item_id,
        status,
    };

    state.queue.report_status(&report(4)).await.unwrap();
    let polled = state.queue.list_pending_work("device-07").await.unwrap();
    assert_eq!(polled[0].status, OrderStatus::Processing);
    assert_eq!(polled[0].coffee_list[0].status_name, "制作中");

    state.queue.report_status(&report(5)).await.unwrap();
    assert!(
        state
            .queue
            .list_pending_work("device-07")
            .await
            .unwrap()
            .is_empty()
    );
    let detail = state.orders.get_detail(order_id).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Completed);

    // duplicate completion report is harmless
    state.queue.report_status(&report(5)).await.unwrap();
}

#[tokio::test]
async fn poll_serves_only_items_still_in_production() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let req = serde_json::from_value(serde_json::json!({
        "orderNum": "Q-1",
        "deviceId": "device-05",
        "totalPrice": 7.5,
        "status": 2,
        "items": [
            {"goodsName": "Americano", "goodsType": 1, "quantity": 1, "price": 3.0},
            {"goodsName": "Milk Tea", "goodsType": 2, "quantity": 1, "price": 4.5}
        ]
    }))
    .unwrap();
    let detail = state.orders.create_order(req).await.unwrap();
    let order_id = detail.order.id;
    let coffee = detail
        .items
        .iter()
        .find(|i| i.product_name == "Americano")
        .unwrap()
        .id;

    let queued = state
        .queue
        .queue_paid_order(&OrderQueueRequest {
            order_num: "Q-1".into(),
            device_id: None,
            category: 1,
        })
        .await
        .unwrap();
    // orderQueue still answers with the whole order
    assert_eq!(queued.all_items().count(), 2);

    let polled = state.queue.list_pending_work("device-05").await.unwrap();
    let ids: Vec<i64> = polled[0].all_items().map(|i| i.id).collect();
    assert_eq!(ids, vec![coffee]);
    assert!(polled[0].milk_tea_list.is_empty());

    for status in [4, 5] {
        state
            .queue
            .report_status(&EditDeviceOrderStatusRequest {
                order_id,
                order_goods_id: coffee,
                status,
            })
            .await
            .unwrap();
    }

    // [Completed, Paid] keeps the order in Processing
    for _ in 0..2 {
        let polled = state.queue.list_pending_work("device-05").await.unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].status, OrderStatus::Processing);
        assert_eq!(polled[0].all_items().count(), 0);
    }
}

#[tokio::test]
async fn unknown_order_item_pair_is_not_found() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let detail = state
        .orders
        .create_order(latte_request("B-2", "device-01"))
        .await
        .unwrap();

    let err = state
        .queue
        .report_status(&EditDeviceOrderStatusRequest {
            order_id: detail.order.id,
            order_goods_id: detail.items[0].id + 100,
            status: 4,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OrderItemNotFound);
    assert_eq!(err.http_status(), http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn out_of_stock_alert_survives_top_up() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let milk = state
        .ledger
        .create_item(stock_item("Whole Milk", "ml", 500.0, 1000.0))
        .await
        .unwrap();

    state
        .ledger
        .record(
            milk.id,
            RecordTransactionRequest {
                transaction_type: TransactionType::Waste,
                quantity: 500.0,
                reference_id: None,
                note: Some("spilled".into()),
            },
        )
        .await
        .unwrap();

    let alerts = state.alerts.list_alerts(false).await.unwrap();
    let out = alerts
        .iter()
        .find(|a| a.alert_type == AlertType::OutOfStock)
        .unwrap();
    assert_eq!(out.priority, 1);

    state
        .ledger
        .record(
            milk.id,
            RecordTransactionRequest {
                transaction_type: TransactionType::TopUp,
                quantity: 5000.0,
                reference_id: None,
                note: None,
            },
        )
        .await
        .unwrap();

    let alerts = state.alerts.list_alerts(false).await.unwrap();
    assert!(
        alerts
            .iter()
            .any(|a| a.alert_type == AlertType::OutOfStock && !a.is_resolved)
    );
}

#[tokio::test]
async fn repeated_low_stock_keeps_one_open_alert() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let cups = state
        .ledger
        .create_item(stock_item("12oz Cup", "pcs", 20.0, 10.0))
        .await
        .unwrap();

    for _ in 0..5 {
        state
            .ledger
            .record(
                cups.id,
                RecordTransactionRequest {
                    transaction_type: TransactionType::Waste,
                    quantity: 3.0,
                    reference_id: None,
                    note: None,
                },
            )
            .await
            .unwrap();
    }

    let alerts = state.alerts.list_alerts(false).await.unwrap();
    let low: Vec<_> = alerts
        .iter()
        .filter(|a| a.alert_type == AlertType::LowStock)
        .collect();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].current_value, 5.0);
}

#[tokio::test]
async fn consumption_is_idempotent_per_order() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    seed_latte_stock(&state).await;
    let detail = state
        .orders
        .create_order(latte_request("C-1", "device-01"))
        .await
        .unwrap();

    let again = state.ledger.consume_for_order(detail.order.id).await.unwrap();
    assert!(!again.claimed);

    let consumed = state
        .ledger
        .transactions_for_order(detail.order.id)
        .await
        .unwrap();
    assert_eq!(consumed.len(), 4);
}

#[tokio::test]
async fn concurrent_consumption_records_one_set() {
    let state = memory_state(ConsumptionPolicy::OnComplete);
    seed_latte_stock(&state).await;
    let detail = state
        .orders
        .create_order(latte_request("C-2", "device-01"))
        .await
        .unwrap();
    let order_id = detail.order.id;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ledger = state.ledger.clone();
            tokio::spawn(async move { ledger.consume_for_order(order_id).await.unwrap() })
        })
        .collect();
    let mut claimed = 0;
    for handle in handles {
        if handle.await.unwrap().claimed {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);
    assert_eq!(
        state
            .ledger
            .transactions_for_order(order_id)
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn failed_transition_rolls_back_earlier_writes() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let detail = state
        .orders
        .create_order(latte_request("R-1", "device-01"))
        .await
        .unwrap();
    let item_id = detail.items[0].id;

    let mut tx: Box<dyn StorageTx> = state.storage.begin().await.unwrap();
    let order = tx.find_order(detail.order.id).await.unwrap().unwrap();
    let err = state
        .orders
        .transition_in(
            tx.as_mut(),
            &order,
            &[(item_id, OrderStatus::Processing), (9999, OrderStatus::Processing)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OrderItemNotFound);
    drop(tx);

    let detail = state.orders.get_detail(detail.order.id).await.unwrap();
    assert_eq!(detail.items[0].status, OrderStatus::Queuing);
    assert_eq!(detail.order.status, OrderStatus::Queuing);
}

#[tokio::test]
async fn ledger_replay_matches_cache_after_mixed_activity() {
    let state = memory_state(ConsumptionPolicy::OnCreate);
    let items = seed_latte_stock(&state).await;
    for n in 0..3 {
        state
            .orders
            .create_order(latte_request(&format!("L-{n}"), "device-01"))
            .await
            .unwrap();
    }
    state
        .ledger
        .record(
            items[1].id,
            RecordTransactionRequest {
                transaction_type: TransactionType::Adjustment,
                quantity: -42.5,
                reference_id: None,
                note: Some("stocktake".into()),
            },
        )
        .await
        .unwrap();

    let audit = state.ledger.audit().await.unwrap();
    assert_eq!(audit.len(), 4);
    assert!(audit.iter().all(|e| e.consistent), "{audit:?}");
}

#[tokio::test]
async fn cancelled_items_are_not_consumed_on_completion() {
    let state = memory_state(ConsumptionPolicy::OnComplete);
    seed_latte_stock(&state).await;
    let detail = state
        .orders
        .create_order(latte_request("X-1", "device-01"))
        .await
        .unwrap();

    let detail = state
        .orders
        .set_item_status(detail.order.id, detail.items[0].id, OrderStatus::Cancelled)
        .await
        .unwrap();
    // all cancelled → completed, but nothing to consume
    assert_eq!(detail.order.status, OrderStatus::Completed);
    assert!(
        state
            .ledger
            .transactions_for_order(detail.order.id)
            .await
            .unwrap()
            .is_empty()
    );
}
