//! Database Module
//!
//! 存储抽象：所有写路径都走一个工作单元 ([`StorageTx`])。
//!
//! ```text
//! storage.begin() ──▶ tx.insert_order / tx.record ... ──▶ tx.commit()
//!                               │
//!                          (drop without commit = rollback)
//! ```
//!
//! 两个实现：
//!
//! - [`SqliteStorage`] - sqlx SQLite (WAL)，生产使用
//! - [`MemoryStorage`] - 内存实现，测试与 `DATABASE_URL=memory`

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use repository::*;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use shared::{AppError, ErrorCode};
use std::sync::Arc;
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// 连接池耗尽
    #[error("Storage busy: {0}")]
    Busy(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepoError::Duplicate(db_err.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return RepoError::Busy(err.to_string());
        }
        RepoError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for RepoError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RepoError::Database(format!("Failed to apply migrations: {err}"))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::Database(format!("Corrupt JSON column: {err}"))
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => AppError::with_message(ErrorCode::NotFound, msg),
            RepoError::Duplicate(msg) => AppError::conflict(msg),
            RepoError::Database(msg) => AppError::database(msg),
            RepoError::Validation(msg) => AppError::validation(msg),
            RepoError::Busy(msg) => AppError::with_message(ErrorCode::SystemBusy, msg),
        }
    }
}

pub(crate) fn read_only_commit() -> RepoError {
    RepoError::Validation("read-only unit of work cannot commit".into())
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// 存储后端
///
/// `begin()` 开启工作单元；同一时刻只有一个工作单元持有写权限，
/// 调用方在此期间看到的是一致的快照。
/// `begin_read()` 不占写权限，只读查询（设备轮询、列表、详情）走这里。
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Begin a new unit of work
    async fn begin(&self) -> RepoResult<Box<dyn StorageTx>>;

    /// Begin a read-only unit of work; `commit()` on it fails
    async fn begin_read(&self) -> RepoResult<Box<dyn StorageTx>>;

    /// Backend name for health output (`sqlite` / `memory`)
    fn backend(&self) -> &'static str;
}

/// 工作单元
///
/// 所有仓储方法都通过它调用。未 `commit()` 即被丢弃时回滚全部修改。
#[async_trait]
pub trait StorageTx: OrderRepo + InventoryRepo + AlertRepo + DeviceRepo + ProductRepo + Send {
    /// Commit and consume the unit of work
    async fn commit(self: Box<Self>) -> RepoResult<()>;
}

/// Open the storage backend selected by `DATABASE_URL`
///
/// `memory` 选择内存实现，其余按 SQLite 连接串处理。
pub async fn open(database_url: &str) -> RepoResult<Arc<dyn Storage>> {
    if database_url == "memory" {
        tracing::warn!("Using in-memory storage, data will not survive a restart");
        return Ok(Arc::new(MemoryStorage::new()));
    }
    let storage = SqliteStorage::connect(database_url).await?;
    Ok(Arc::new(storage))
}
