//! Shared types for the Brew backend
//!
//! 领域模型、设备/管理端线上协议 DTO、统一错误码，
//! 供 brew-server 与外部工具共用。

pub mod error;
pub mod models;
pub mod request;
pub mod response;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use models::{ItemCategory, OrderStatus};
