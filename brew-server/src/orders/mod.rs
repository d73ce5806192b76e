//! Order fulfillment
//!
//! - [`store`] - 订单持久化与状态流转
//! - [`status`] - 订单状态推导
//! - [`queue`] - 设备轮询协议

pub mod queue;
pub mod status;
pub mod store;

pub use queue::DeviceQueue;
pub use status::derive_aggregate;
pub use store::{OrderStore, Transition};
