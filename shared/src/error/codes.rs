//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 6xxx: Product errors
//! - 7xxx: Device errors
//! - 8xxx: Inventory errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// 以 u16 序列化，设备端和管理端按数值判断。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order number already used
    OrderNumberExists = 4002,
    /// Invalid order status value
    InvalidOrderStatus = 4004,
    /// Illegal status transition
    InvalidStatusTransition = 4005,
    /// Order item not found
    OrderItemNotFound = 4006,
    /// Order is empty
    OrderEmpty = 4007,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product has invalid price
    ProductInvalidPrice = 6002,
    /// Product name already exists
    ProductNameExists = 6004,

    // ==================== 7xxx: Device ====================
    /// No snapshot reported by the device yet
    DeviceSnapshotNotFound = 7001,

    // ==================== 8xxx: Inventory ====================
    /// Inventory item not found
    InventoryItemNotFound = 8001,
    /// Inventory item name already exists
    InventoryItemExists = 8002,
    /// Invalid transaction quantity
    InvalidQuantity = 8003,
    /// Transaction type not allowed here
    InvalidTransactionType = 8004,
    /// Alert not found
    AlertNotFound = 8101,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Request exceeded the server timeout
    TimeoutError = 9004,
    /// Storage busy (connection pool exhausted), retry later
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderNumberExists => "Order number already exists",
            ErrorCode::InvalidOrderStatus => "Invalid order status",
            ErrorCode::InvalidStatusTransition => "Illegal status transition",
            ErrorCode::OrderItemNotFound => "Order item not found",
            ErrorCode::OrderEmpty => "Order is empty",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductInvalidPrice => "Product has invalid price",
            ErrorCode::ProductNameExists => "Product name already exists",

            // Device
            ErrorCode::DeviceSnapshotNotFound => "No status snapshot reported by device",

            // Inventory
            ErrorCode::InventoryItemNotFound => "Inventory item not found",
            ErrorCode::InventoryItemExists => "Inventory item already exists",
            ErrorCode::InvalidQuantity => "Invalid quantity",
            ErrorCode::InvalidTransactionType => "Transaction type not allowed",
            ErrorCode::AlertNotFound => "Alert not found",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderNumberExists),
            4004 => Ok(ErrorCode::InvalidOrderStatus),
            4005 => Ok(ErrorCode::InvalidStatusTransition),
            4006 => Ok(ErrorCode::OrderItemNotFound),
            4007 => Ok(ErrorCode::OrderEmpty),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductInvalidPrice),
            6004 => Ok(ErrorCode::ProductNameExists),

            // Device
            7001 => Ok(ErrorCode::DeviceSnapshotNotFound),

            // Inventory
            8001 => Ok(ErrorCode::InventoryItemNotFound),
            8002 => Ok(ErrorCode::InventoryItemExists),
            8003 => Ok(ErrorCode::InvalidQuantity),
            8004 => Ok(ErrorCode::InvalidTransactionType),
            8101 => Ok(ErrorCode::AlertNotFound),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}
