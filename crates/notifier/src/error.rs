//! 通知分发错误类型
//!
//! 定义消息解析、字段校验、收件人解析和通知写入等场景的错误分类。
//! 所有错误对当前消息都是终结性的：服务内不做重试，
//! 瞬时故障依赖消息队列的重新投递恢复。

use notifier_shared::error::SharedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    /// 消息体既不是已知类型，也不是旧版 package/version 格式
    #[error("消息解析失败: {0}")]
    Parse(String),

    /// package_update 缺少必填字段
    #[error("消息字段校验失败: 缺少 {field}")]
    Validation { field: &'static str },

    /// 查询组织成员失败，不使用任何部分结果
    #[error("收件人解析失败: organization_id={organization_id}, 原因={reason}")]
    Resolution {
        organization_id: String,
        reason: String,
    },

    /// 组织下没有成员，package_update 不创建通知
    #[error("组织下没有可通知的用户: organization_id={organization_id}")]
    NoRecipients { organization_id: String },

    /// 事务开启、通知插入或提交失败，事务整体回滚
    #[error("通知写入失败: 阶段={stage}, 原因={reason}")]
    Write { stage: &'static str, reason: String },

    #[error(transparent)]
    Shared(#[from] SharedError),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotifierError>;

impl NotifierError {
    /// 错误类别标签，用于日志字段和指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_failure",
            Self::Validation { .. } => "validation_failure",
            Self::Resolution { .. } => "resolution_failure",
            Self::NoRecipients { .. } => "no_recipients",
            Self::Write { .. } => "write_failure",
            Self::Shared(_) => "infrastructure_failure",
        }
    }

    pub(crate) fn write(stage: &'static str, err: sqlx::Error) -> Self {
        Self::Write {
            stage,
            reason: err.to_string(),
        }
    }
}
