//! 通知写入
//!
//! 在单个事务内插入一条通知并逐个关联收件人，最后提交。
//!
//! - 通知插入失败：事务随 drop 回滚，不留下任何记录
//! - 单个收件人关联失败：记录日志后继续处理其余收件人。每个收件人在独立的
//!   SAVEPOINT 中插入，失败只回滚到该保存点，外层事务仍可提交
//! - 提交失败：整个事务回滚，消息按失败处理
//!
//! 关联表上的唯一约束配合 `ON CONFLICT DO NOTHING` 使重复关联成为空操作，
//! 这是消息重复投递时收件人关联保持唯一的保证。通知本身不去重。

use sqlx::{Connection, PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{NotifierError, Result};
use crate::renderer::NewNotification;

/// 一次写入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub notification_id: Uuid,
    /// 成功关联（含已存在而被忽略）的收件人数
    pub attached: usize,
    /// 关联失败并被跳过的收件人数
    pub failed: usize,
}

/// 写入通知及其收件人
pub async fn write_notification(
    pool: &PgPool,
    notification: &NewNotification,
    recipients: &[String],
) -> Result<WriteOutcome> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| NotifierError::write("begin", e))?;

    let notification_id = insert_notification(&mut tx, notification)
        .await
        .map_err(|e| NotifierError::write("insert", e))?;

    let mut attached = 0;
    let mut failed = 0;
    for user_id in recipients.iter().filter(|id| !id.is_empty()) {
        match attach_recipient(&mut tx, notification_id, user_id).await {
            Ok(()) => attached += 1,
            Err(e) => {
                failed += 1;
                warn!(
                    notification_id = %notification_id,
                    user_id = %user_id,
                    error = %e,
                    "关联收件人失败，跳过"
                );
            }
        }
    }

    tx.commit()
        .await
        .map_err(|e| NotifierError::write("commit", e))?;

    info!(
        notification_id = %notification_id,
        content_type = notification.content_type.as_str(),
        attached,
        failed,
        "通知已写入"
    );

    Ok(WriteOutcome {
        notification_id,
        attached,
        failed,
    })
}

/// 插入通知行，返回数据库生成的 ID
pub async fn insert_notification(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> sqlx::Result<Uuid> {
    sqlx::query_scalar(
        r#"
        INSERT INTO notification (title, description, content, type, content_type)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&notification.title)
    .bind(&notification.description)
    .bind(&notification.content)
    .bind(notification.level.as_str())
    .bind(notification.content_type.as_str())
    .fetch_one(conn)
    .await
}

/// 在保存点内关联单个收件人，已存在的关联视为成功
pub async fn attach_recipient(
    conn: &mut PgConnection,
    notification_id: Uuid,
    user_id: &str,
) -> sqlx::Result<()> {
    let mut savepoint = conn.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO notification_users_user ("notificationId", "userId")
        VALUES ($1, $2::uuid)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(&mut *savepoint)
    .await?;

    savepoint.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ContentType, NotificationLevel};
    use notifier_shared::config::DatabaseConfig;
    use notifier_shared::database;
    use serde_json::json;

    #[tokio::test]
    async fn test_begin_failure_writes_nothing() {
        let config = DatabaseConfig {
            min_connections: 0,
            ..Default::default()
        };
        let pool = database::connect_lazy(&config).unwrap();
        pool.close().await;

        let notification = NewNotification {
            title: "Vulnerability summary".to_string(),
            description: "No vulnerabilities found".to_string(),
            level: NotificationLevel::Info,
            content_type: ContentType::VulnSummary,
            content: json!({}),
        };

        let err = write_notification(&pool, &notification, &["user-1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, NotifierError::Write { stage: "begin", .. }));
    }
}
