//! Notification bus
//!
//! ```text
//! OrderStore / InventoryLedger / AlertEngine
//!          │ publish() (after commit)
//!          ▼
//!   broadcast::Sender<Notification> ──▶ subscribers (logging task, tests)
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 资源版本管理器
///
/// 每种资源类型维护独立的版本号，支持原子递增。
#[derive(Debug, Default)]
pub struct ResourceVersions {
    versions: DashMap<String, u64>,
}

impl ResourceVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 递增指定资源的版本号并返回新值（从 1 开始）
    pub fn increment(&self, resource: &str) -> u64 {
        let mut entry = self.versions.entry(resource.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// 当前版本号，未出现过的资源为 0
    pub fn get(&self, resource: &str) -> u64 {
        self.versions.get(resource).map(|v| *v).unwrap_or(0)
    }
}

/// 资源变更通知
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub resource: String,
    pub action: String,
    pub id: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// 通知总线
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
    versions: Arc<ResourceVersions>,
    shutdown_token: CancellationToken,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            versions: Arc::new(ResourceVersions::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 发布变更；没有订阅者时静默丢弃
    pub fn publish<T: Serialize>(&self, resource: &str, action: &str, id: impl ToString, data: Option<&T>) {
        let version = self.versions.increment(resource);
        let notification = Notification {
            resource: resource.to_string(),
            action: action.to_string(),
            id: id.to_string(),
            version,
            data: data.and_then(|d| serde_json::to_value(d).ok()),
        };
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn versions(&self) -> &ResourceVersions {
        &self.versions
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// 后台任务：以 debug 级别记录所有通知，直到关闭
    pub fn spawn_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        let token = self.shutdown_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(n) => tracing::debug!(
                            resource = %n.resource,
                            action = %n.action,
                            id = %n.id,
                            version = n.version,
                            "Resource changed"
                        ),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Notification logger lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Notification logger stopped");
        })
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
