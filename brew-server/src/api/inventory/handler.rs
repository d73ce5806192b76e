//! Inventory API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use shared::ApiResponse;
use shared::models::{
    Alert, InventoryItem, InventoryItemCreate, InventoryTransaction, LedgerAuditEntry,
};
use shared::request::{PaginationQuery, RecordTransactionRequest};

use crate::api::{ApiJson, AppResult, ok};
use crate::core::ServerState;

/// 人工入账结果
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    transaction: InventoryTransaction,
    current_stock: f64,
    alerts: Vec<Alert>,
}

pub async fn list(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<Vec<InventoryItem>>>> {
    let items = state.ledger.list_items().await?;
    Ok(ok(items))
}

pub async fn create(
    State(state): State<ServerState>,
    ApiJson(payload): ApiJson<InventoryItemCreate>,
) -> AppResult<Json<ApiResponse<InventoryItem>>> {
    let item = state.ledger.create_item(payload).await?;
    Ok(ok(item))
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<InventoryItem>>> {
    let item = state.ledger.get_item(id).await?;
    Ok(ok(item))
}

pub async fn list_transactions(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(page): Query<PaginationQuery>,
) -> AppResult<Json<ApiResponse<Vec<InventoryTransaction>>>> {
    let transactions = state.ledger.list_transactions(id, &page).await?;
    Ok(ok(transactions))
}

pub async fn record_transaction(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<RecordTransactionRequest>,
) -> AppResult<Json<ApiResponse<RecordResponse>>> {
    let outcome = state.ledger.record(id, req).await?;
    Ok(ok(RecordResponse {
        transaction: outcome.transaction,
        current_stock: outcome.new_stock,
        alerts: outcome.alerts,
    }))
}

pub async fn audit(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<Vec<LedgerAuditEntry>>>> {
    let entries = state.ledger.audit().await?;
    Ok(ok(entries))
}
