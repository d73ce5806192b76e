//! 工具模块 - 通用工具函数和类型
//!
//! # 内容
//!
//! - [`AppError`] - 应用错误类型 (from shared::error)
//! - [`ApiResponse`] - API 响应结构 (from shared::error)
//! - [`money`] - 金额计算 (rust_decimal)
//! - 日志初始化

pub mod logger;
pub mod money;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

use axum::Json;

/// Wrap data in the success envelope
pub fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}
