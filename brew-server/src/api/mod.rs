//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`device`] - 设备轮询协议 (`/api/device/*`)
//! - [`orders`] - 下单与订单查询
//! - [`inventory`] - 库存物料、流水、账本核对
//! - [`alerts`] - 库存告警
//! - [`products`] - 商品与可售状态
//!
//! 所有响应使用 `{code, msg, data}` 信封。

pub mod extract;

pub mod alerts;
pub mod device;
pub mod health;
pub mod inventory;
pub mod orders;
pub mod products;

use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::{Router, middleware};
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::{BoxError, ServiceBuilder};
use tower_http::cors::CorsLayer;

use crate::core::ServerState;
use crate::utils::{AppError, ErrorCode};

pub use crate::utils::{AppResult, ok};
pub use extract::ApiJson;

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        target: "http_access",
        "{} {} {} {}ms",
        method,
        uri,
        response.status(),
        started.elapsed().as_millis()
    );
    response
}

/// 中间件错误转成信封；超时为 TimeoutError
async fn handle_layer_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::with_message(ErrorCode::TimeoutError, "Request timed out")
    } else {
        AppError::internal(format!("Unhandled middleware error: {err}"))
    }
}

/// Build the Axum router (without state)
pub fn build_app() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(device::router())
        .merge(orders::router())
        .merge(inventory::router())
        .merge(alerts::router())
        .merge(products::router())
}

/// 带状态与中间件的完整应用
pub fn app(state: ServerState) -> Router {
    let timeout = Duration::from_millis(state.config.request_timeout_ms);
    // 自外向内：访问日志 → CORS → 超时
    build_app().with_state(state).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(log_request))
            .layer(CorsLayer::permissive())
            .layer(HandleErrorLayer::new(handle_layer_error))
            .layer(TimeoutLayer::new(timeout)),
    )
}
