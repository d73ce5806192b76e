//! Alert API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use shared::models::{Alert, AlertView};
use shared::request::ResolveAllAlertsRequest;
use shared::{ApiResponse, AppError};

use crate::api::{AppResult, ok};
use crate::core::ServerState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Serialize)]
pub struct ResolvedCount {
    resolved: u64,
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<AlertView>>>> {
    let alerts = state.alerts.list_alerts(query.include_resolved).await?;
    Ok(ok(alerts))
}

pub async fn resolve(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Alert>>> {
    let alert = state.alerts.resolve_alert(id).await?;
    Ok(ok(alert))
}

/// 请求体可省略
pub async fn resolve_all(
    State(state): State<ServerState>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<ResolvedCount>>> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        ResolveAllAlertsRequest::default()
    } else {
        serde_json::from_slice::<ResolveAllAlertsRequest>(&body)
            .map_err(|e| AppError::invalid_request(format!("Invalid request body: {e}")))?
    };
    let resolved = state.alerts.resolve_all(req.item_id).await?;
    Ok(ok(ResolvedCount { resolved }))
}
