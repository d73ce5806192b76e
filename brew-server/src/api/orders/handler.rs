//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::ApiResponse;
use shared::models::{InventoryTransaction, OrderDetail};
use shared::request::CreateOrderRequest;

use crate::api::{ApiJson, AppResult, ok};
use crate::core::ServerState;

pub async fn create_order(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let detail = state.orders.create_order(req).await?;
    Ok(ok(detail))
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let detail = state.orders.get_detail(id).await?;
    Ok(ok(detail))
}

/// Consumption transactions booked against an order
pub async fn consumption(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<InventoryTransaction>>>> {
    state.orders.get_detail(id).await?;
    let transactions = state.ledger.transactions_for_order(id).await?;
    Ok(ok(transactions))
}
