//! Product API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use shared::ApiResponse;
use shared::models::{IngredientRequirement, Product, ProductAvailability, ProductCreate};
use shared::request::ProductListQuery;

use crate::api::{ApiJson, AppResult, ok};
use crate::core::ServerState;

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ProductListQuery>,
) -> AppResult<Json<ApiResponse<Vec<ProductAvailability>>>> {
    let products = state.availability.list_products(&query).await?;
    Ok(ok(products))
}

pub async fn create(
    State(state): State<ServerState>,
    ApiJson(payload): ApiJson<ProductCreate>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = state.availability.create_product(payload).await?;
    Ok(ok(product))
}

pub async fn set_requirements(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<IngredientRequirement>,
) -> AppResult<Json<ApiResponse<IngredientRequirement>>> {
    let requirement = state.availability.set_requirements(id, payload).await?;
    Ok(ok(requirement))
}
