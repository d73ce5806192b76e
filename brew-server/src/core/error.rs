use thiserror::Error;

use crate::db::RepoError;

/// 启动与运行期错误（请求级错误走 [`shared::AppError`]）
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("存储初始化失败: {0}")]
    Storage(#[from] RepoError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
