//! 存储抽象
//!
//! 消息管道通过 `NotificationStore` 访问收件人解析和通知写入，
//! 便于在测试中替换为 mock 或内存实现。

use async_trait::async_trait;
use tracing::info;
use sqlx::PgPool;

use crate::error::Result;
use crate::recipients;
use crate::renderer::NewNotification;
use crate::writer::{self, WriteOutcome};

/// 通知存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// 查询组织成员，返回去重且非空的用户 ID
    async fn organization_members(&self, organization_id: &str) -> Result<Vec<String>>;

    /// 在单个事务内写入通知并关联收件人
    async fn persist(
        &self,
        notification: &NewNotification,
        recipients: &[String],
    ) -> Result<WriteOutcome>;
}

/// 基于 PostgreSQL 的存储实现，持有连接池
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 关闭连接池，等待进行中的事务归还连接
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn organization_members(&self, organization_id: &str) -> Result<Vec<String>> {
        recipients::fetch_organization_members(&self.pool, organization_id).await
    }

    async fn persist(
        &self,
        notification: &NewNotification,
        recipients: &[String],
    ) -> Result<WriteOutcome> {
        writer::write_notification(&self.pool, notification, recipients).await
    }
}
