//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 业务相关的错误分类由各服务自行定义，并通过 `#[from]` 透传本类型。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Kafka 错误: {0}")]
    Kafka(String),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;
