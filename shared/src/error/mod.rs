//! Unified error system
//!
//! - [`ErrorCode`]: 标准化错误码
//! - [`ErrorCategory`]: 按号段分类
//! - [`AppError`]: 带错误码、消息和详情的错误类型
//! - [`ApiResponse`]: 统一响应信封 `{code, msg, data}`
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 6xxx: Product errors
//! - 7xxx: Device errors
//! - 8xxx: Inventory errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ApiResponse};
//!
//! let err = AppError::with_message(ErrorCode::OrderItemNotFound, "Order item 7 not found")
//!     .with_detail("order_goods_id", 7);
//! let body = ApiResponse::<()>::error(&err);
//! assert_eq!(body.code, 4006);
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult};
