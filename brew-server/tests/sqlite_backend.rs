//! SQLite backend parity: the same flows as the in-memory backend

mod common;

use brew_server::db::{InventoryRepo, NewOrder, OrderRepo, RepoError, Storage};
use brew_server::ServerState;
use common::*;
use shared::ErrorCode;
use shared::models::{AlertType, OrderStatus, TransactionType};
use shared::request::{EditDeviceOrderStatusRequest, RecordTransactionRequest, SaveDeviceMatterRequest};

async fn full_flow(state: &ServerState) {
    seed_latte_stock(state).await;

    let detail = state
        .orders
        .create_order(latte_request("S-1", "device-01"))
        .await
        .unwrap();
    let err = state
        .orders
        .create_order(latte_request("S-1", "device-01"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OrderNumberExists);

    let consumed = state
        .ledger
        .transactions_for_order(detail.order.id)
        .await
        .unwrap();
    assert_eq!(consumed.len(), 4);

    let polled = state.queue.list_pending_work("device-01").await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(
        polled[0].coffee_list[0].json_code_val,
        r#"[{"BeanCode":"1"},{"MilkCode":"1"},{"CupCode":"3"},{"ClassCode":"12"}]"#
    );

    for status in [4, 5, 5] {
        state
            .queue
            .report_status(&EditDeviceOrderStatusRequest {
                order_id: detail.order.id,
                order_goods_id: detail.items[0].id,
                status,
            })
            .await
            .unwrap();
    }
    assert!(state.queue.list_pending_work("device-01").await.unwrap().is_empty());
    assert_eq!(
        state.orders.get_detail(detail.order.id).await.unwrap().order.status,
        OrderStatus::Completed
    );
    assert_eq!(
        state
            .ledger
            .transactions_for_order(detail.order.id)
            .await
            .unwrap()
            .len(),
        4
    );

    let cups = state
        .ledger
        .list_items()
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.name == "12oz Cup")
        .unwrap();
    for _ in 0..2 {
        state
            .ledger
            .record(
                cups.id,
                RecordTransactionRequest {
                    transaction_type: TransactionType::Waste,
                    quantity: 99.0,
                    reference_id: None,
                    note: None,
                },
            )
            .await
            .unwrap();
    }
    let open = state.alerts.list_alerts(false).await.unwrap();
    let out: Vec<_> = open
        .iter()
        .filter(|a| a.alert_type == AlertType::OutOfStock)
        .collect();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].current_value, -99.0);
    assert_eq!(out[0].item_name, "12oz Cup");

    assert_eq!(state.alerts.resolve_all(Some(cups.id)).await.unwrap(), 1);
    assert!(state.alerts.list_alerts(false).await.unwrap().is_empty());

    let audit = state.ledger.audit().await.unwrap();
    assert!(audit.iter().all(|e| e.consistent), "{audit:?}");

    state
        .queue
        .save_device_matter(SaveDeviceMatterRequest {
            device_id: Some("device-01".into()),
            matter_status_json: Some(serde_json::json!({"bean_1": 1, "milk_1": 0})),
            device_status_json: Some(serde_json::json!({"boiler": true})),
        })
        .await
        .unwrap();
    let snapshot = state.queue.latest_snapshot("device-01").await.unwrap();
    assert_eq!(snapshot.ingredients.get("milk_1"), Some(&0.0));
    assert_eq!(snapshot.health.get("boiler"), Some(&serde_json::json!(true)));
}

#[tokio::test]
async fn sqlite_in_memory_matches_memory_backend() {
    let state = sqlite_state("sqlite::memory:").await;
    assert_eq!(state.backend(), "sqlite");
    full_flow(&state).await;
}

#[tokio::test]
async fn sqlite_on_disk_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("brew.db").display());

    let order_id = {
        let state = sqlite_state(&url).await;
        full_flow(&state).await;
        state
            .orders
            .create_order(latte_request("S-2", "device-02"))
            .await
            .unwrap()
            .order
            .id
    };

    let state = sqlite_state(&url).await;
    let detail = state.orders.get_detail(order_id).await.unwrap();
    assert_eq!(detail.order.order_num, "S-2");
    assert_eq!(state.queue.list_pending_work("device-02").await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_uncommitted_unit_of_work_rolls_back() {
    let state = sqlite_state("sqlite::memory:").await;
    let milk = state
        .ledger
        .create_item(stock_item("Whole Milk", "ml", 100.0, 0.0))
        .await
        .unwrap();

    {
        let mut tx = state.storage.begin().await.unwrap();
        let ghost = tx
            .insert_order(NewOrder {
                order_num: "GHOST".into(),
                device_id: "device-01".into(),
                status: OrderStatus::Queuing,
                total_price: 1.0,
                items_total: 1.0,
                now: 1,
            })
            .await
            .unwrap();
        tx.apply_stock_delta(milk.id, -50.0, 1).await.unwrap();
        assert!(tx.claim_consumption(ghost.id, 1).await.unwrap());
        // dropped without commit
    }

    let mut tx = state.storage.begin().await.unwrap();
    assert!(tx.find_order_by_num("GHOST").await.unwrap().is_none());
    assert_eq!(
        tx.find_inventory_item(milk.id)
            .await
            .unwrap()
            .unwrap()
            .current_stock,
        100.0
    );
}

#[tokio::test]
async fn sqlite_reads_run_beside_an_open_writer() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("brew.db").display());
    let state = sqlite_state(&url).await;
    state
        .orders
        .create_order(latte_request("W-1", "device-01"))
        .await
        .unwrap();

    let mut writer = state.storage.begin().await.unwrap();
    writer
        .insert_order(NewOrder {
            order_num: "W-2".into(),
            device_id: "device-01".into(),
            status: OrderStatus::Queuing,
            total_price: 1.0,
            items_total: 1.0,
            now: 1,
        })
        .await
        .unwrap();

    let polled = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        state.queue.list_pending_work("device-01"),
    )
    .await
    .expect("poll waited for the writer")
    .unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].order_num, "W-1");

    let reader = state.storage.begin_read().await.unwrap();
    assert!(matches!(
        reader.commit().await.unwrap_err(),
        RepoError::Validation(_)
    ));

    writer.commit().await.unwrap();
    assert_eq!(state.queue.list_pending_work("device-01").await.unwrap().len(), 2);
}
