//! 变更通知
//!
//! 提交成功后的资源变更广播（订单、库存、告警、快照）。
//! 进程内订阅，推送通道不在本服务范围内。

pub mod bus;

pub use bus::{Notification, NotificationBus, ResourceVersions};
