//! 消息处理管道
//!
//! 单条消息的完整流程：分类 -> 渲染 -> 解析收件人 -> 事务写入。
//! 每条消息独立处理，消息之间除连接池外不共享可变状态。
//! 所有失败都只终结当前消息，管道本身不重试。

use std::sync::Arc;
use std::time::Instant;

use notifier_shared::observability::metrics;
use tracing::warn;

use crate::classifier;
use crate::error::{NotifierError, Result};
use crate::legacy;
use crate::payload::InboundMessage;
use crate::renderer::{self, NewNotification};
use crate::store::NotificationStore;
use crate::writer::WriteOutcome;

/// 单条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// 通知已写入
    Created(WriteOutcome),
    /// 旧版请求，已记录但不产生通知
    Legacy,
}

impl MessageOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Legacy => "legacy",
        }
    }
}

pub struct MessagePipeline<S> {
    store: Arc<S>,
}

impl<S: NotificationStore> MessagePipeline<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 处理一条原始消息并记录指标
    pub async fn handle(&self, payload: &[u8]) -> Result<MessageOutcome> {
        let started = Instant::now();

        let (kind, result) = match classifier::classify(payload) {
            Ok(message) => {
                let kind = message.kind();
                (kind, self.process(message).await)
            }
            Err(e) => ("unknown", Err(e)),
        };

        let outcome = match &result {
            Ok(outcome) => {
                if let MessageOutcome::Created(write) = outcome {
                    metrics::record_recipients(write.attached, write.failed);
                }
                outcome.label()
            }
            Err(e) => e.kind(),
        };
        metrics::record_message(kind, outcome, started.elapsed().as_secs_f64());

        result
    }

    /// 处理已分类的消息
    pub async fn process(&self, message: InboundMessage) -> Result<MessageOutcome> {
        match message {
            InboundMessage::VulnSummary(summary) => {
                let notification = renderer::render_vuln_summary(&summary);
                self.deliver(&summary.organization_id, notification).await
            }
            InboundMessage::PackageUpdate(update) => {
                let notification = renderer::render_package_update(&update);
                self.deliver(&update.organization_id, notification).await
            }
            InboundMessage::Legacy(request) => {
                legacy::process(&request);
                Ok(MessageOutcome::Legacy)
            }
        }
    }

    /// 解析收件人并写入
    ///
    /// 收件人为空时按内容类型决定：漏洞汇总照常写入（不关联任何人），
    /// 依赖更新直接放弃。
    async fn deliver(
        &self,
        organization_id: &str,
        notification: NewNotification,
    ) -> Result<MessageOutcome> {
        let recipients = self.store.organization_members(organization_id).await?;

        if recipients.is_empty() {
            if notification.content_type.requires_recipients() {
                warn!(
                    organization_id,
                    content_type = notification.content_type.as_str(),
                    "组织下没有用户，跳过通知"
                );
                return Err(NotifierError::NoRecipients {
                    organization_id: organization_id.to_string(),
                });
            }
            warn!(
                organization_id,
                content_type = notification.content_type.as_str(),
                "组织下没有用户，通知将不关联任何收件人"
            );
        }

        let outcome = self.store.persist(&notification, &recipients).await?;
        Ok(MessageOutcome::Created(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ContentType, NotificationLevel};
    use crate::store::{MockNotificationStore, PgStore};
    use notifier_shared::config::DatabaseConfig;
    use notifier_shared::database;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn outcome(attached: usize) -> WriteOutcome {
        WriteOutcome {
            notification_id: Uuid::new_v4(),
            attached,
            failed: 0,
        }
    }

    fn lodash_update(organization_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "package_update",
            "organization_id": organization_id,
            "package_name": "lodash",
            "current_version": "4.17.0",
            "new_version": "4.17.21",
            "dependency_type": "production"
        }))
        .unwrap()
    }

    fn vuln_summary(organization_id: &str, total: i64, max_severity: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "vuln_summary",
            "organization_id": organization_id,
            "analysis_id": "analysis-1",
            "total": total,
            "max_severity": max_severity,
            "severity_counts": {"CRITICAL": 1, "HIGH": 0, "MEDIUM": 0, "LOW": 0}
        }))
        .unwrap()
    }

    // ==================== mock 存储 ====================

    #[tokio::test]
    async fn test_package_update_attaches_all_members() {
        let mut store = MockNotificationStore::new();
        store
            .expect_organization_members()
            .withf(|org| org == "org-1")
            .times(1)
            .returning(|_| Ok(vec!["user-1".to_string(), "user-2".to_string()]));
        store
            .expect_persist()
            .withf(|notification, recipients| {
                notification.title == "🔴 Production Update: lodash"
                    && notification.level == NotificationLevel::Warning
                    && notification.description
                        == "Production dependency lodash can be updated from 4.17.0 to 4.17.21"
                    && notification.content_type == ContentType::PackageUpdate
                    && recipients.len() == 2
            })
            .times(1)
            .returning(|_, recipients| Ok(outcome(recipients.len())));

        let pipeline = MessagePipeline::new(Arc::new(store));
        let result = pipeline.handle(&lodash_update("org-1")).await.unwrap();

        let MessageOutcome::Created(write) = result else {
            panic!("expected created outcome");
        };
        assert_eq!(write.attached, 2);
    }

    #[tokio::test]
    async fn test_package_update_without_organization_writes_nothing() {
        let mut store = MockNotificationStore::new();
        store.expect_organization_members().never();
        store.expect_persist().never();

        let pipeline = MessagePipeline::new(Arc::new(store));
        let err = pipeline.handle(&lodash_update("")).await.unwrap_err();

        assert!(matches!(
            err,
            NotifierError::Validation {
                field: "organization_id"
            }
        ));
    }

    #[tokio::test]
    async fn test_vuln_summary_without_organization_is_resolution_failure() {
        let config = DatabaseConfig {
            min_connections: 0,
            ..Default::default()
        };
        let pool = database::connect_lazy(&config).unwrap();
        let pipeline = MessagePipeline::new(Arc::new(PgStore::new(pool)));

        // 空组织在查询前被拒绝，存储层不会建立连接也不会写入
        let err = pipeline
            .handle(&vuln_summary("", 2, "HIGH"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NotifierError::Resolution { ref organization_id, .. } if organization_id.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_package_update_without_members_writes_nothing() {
        let mut store = MockNotificationStore::new();
        store
            .expect_organization_members()
            .times(1)
            .returning(|_| Ok(Vec::new()));
        store.expect_persist().never();

        let pipeline = MessagePipeline::new(Arc::new(store));
        let err = pipeline.handle(&lodash_update("org-empty")).await.unwrap_err();

        assert_eq!(err.kind(), "no_recipients");
    }

    #[tokio::test]
    async fn test_vuln_summary_without_members_is_still_written() {
        let mut store = MockNotificationStore::new();
        store
            .expect_organization_members()
            .times(1)
            .returning(|_| Ok(Vec::new()));
        store
            .expect_persist()
            .withf(|notification, recipients| {
                notification.content_type == ContentType::VulnSummary && recipients.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(outcome(0)));

        let pipeline = MessagePipeline::new(Arc::new(store));
        let result = pipeline
            .handle(&vuln_summary("org-empty", 1, "CRITICAL"))
            .await
            .unwrap();

        assert!(matches!(result, MessageOutcome::Created(w) if w.attached == 0));
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_before_write() {
        let mut store = MockNotificationStore::new();
        store.expect_organization_members().times(1).returning(|org| {
            Err(NotifierError::Resolution {
                organization_id: org.to_string(),
                reason: "connection refused".to_string(),
            })
        });
        store.expect_persist().never();

        let pipeline = MessagePipeline::new(Arc::new(store));
        let err = pipeline
            .handle(&vuln_summary("org-1", 1, "HIGH"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "resolution_failure");
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let mut store = MockNotificationStore::new();
        store
            .expect_organization_members()
            .returning(|_| Ok(vec!["user-1".to_string()]));
        store.expect_persist().times(1).returning(|_, _| {
            Err(NotifierError::Write {
                stage: "commit",
                reason: "could not serialize access".to_string(),
            })
        });

        let pipeline = MessagePipeline::new(Arc::new(store));
        let err = pipeline
            .handle(&vuln_summary("org-1", 0, ""))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "write_failure");
    }

    #[tokio::test]
    async fn test_malformed_and_legacy_messages_never_touch_store() {
        let mut store = MockNotificationStore::new();
        store.expect_organization_members().never();
        store.expect_persist().never();

        let pipeline = MessagePipeline::new(Arc::new(store));

        let err = pipeline.handle(b"{not json").await.unwrap_err();
        assert_eq!(err.kind(), "parse_failure");

        let legacy = br#"{"package":"express","version":"4.18.2","key":"k-1"}"#;
        assert_eq!(pipeline.handle(legacy).await.unwrap(), MessageOutcome::Legacy);
    }

    // ==================== 内存存储 ====================

    /// 模拟关联表唯一约束的内存存储
    #[derive(Default)]
    struct MemoryStore {
        members: HashMap<String, Vec<String>>,
        notifications: Mutex<Vec<(Uuid, NewNotification)>>,
        links: Mutex<HashSet<(Uuid, String)>>,
    }

    #[async_trait::async_trait]
    impl NotificationStore for MemoryStore {
        async fn organization_members(&self, organization_id: &str) -> Result<Vec<String>> {
            Ok(self
                .members
                .get(organization_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn persist(
            &self,
            notification: &NewNotification,
            recipients: &[String],
        ) -> Result<WriteOutcome> {
            let notification_id = Uuid::new_v4();
            self.notifications
                .lock()
                .unwrap()
                .push((notification_id, notification.clone()));

            let mut links = self.links.lock().unwrap();
            let mut attached = 0;
            for user_id in recipients.iter().filter(|id| !id.is_empty()) {
                // 重复关联是空操作而不是错误
                links.insert((notification_id, user_id.clone()));
                attached += 1;
            }

            Ok(WriteOutcome {
                notification_id,
                attached,
                failed: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_redelivery_creates_new_notification_with_unique_links() {
        let store = Arc::new(MemoryStore {
            members: HashMap::from([(
                "org-1".to_string(),
                vec!["user-1".to_string(), "user-2".to_string()],
            )]),
            ..Default::default()
        });
        let pipeline = MessagePipeline::new(store.clone());
        let message = vuln_summary("org-1", 1, "CRITICAL");

        let first = pipeline.handle(&message).await.unwrap();
        let second = pipeline.handle(&message).await.unwrap();
        assert_ne!(first, second);

        let notifications = store.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].1, notifications[1].1);
        assert_eq!(notifications[0].1.level, NotificationLevel::Error);

        let links = store.links.lock().unwrap();
        assert_eq!(links.len(), 4);
        for (notification_id, _) in notifications.iter() {
            assert!(links.contains(&(*notification_id, "user-1".to_string())));
            assert!(links.contains(&(*notification_id, "user-2".to_string())));
        }
    }

    #[tokio::test]
    async fn test_zero_total_description_regardless_of_counts() {
        let store = Arc::new(MemoryStore {
            members: HashMap::from([("org-1".to_string(), vec!["user-1".to_string()])]),
            ..Default::default()
        });
        let pipeline = MessagePipeline::new(store.clone());

        pipeline
            .handle(&vuln_summary("org-1", 0, "MEDIUM"))
            .await
            .unwrap();

        let notifications = store.notifications.lock().unwrap();
        assert_eq!(notifications[0].1.description, "No vulnerabilities found");
        assert_eq!(notifications[0].1.level, NotificationLevel::Warning);
    }
}
