//! Data models
//!
//! Shared between brew-server and admin tooling (via API).
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY)，时间戳为 Unix millis。

pub mod alert;
pub mod device;
pub mod inventory;
pub mod order;
pub mod product;

// Re-exports
pub use alert::*;
pub use device::*;
pub use inventory::*;
pub use order::*;
pub use product::*;
