//! 通知请求消费者
//!
//! 从 Kafka 消费通知请求，逐条交给消息管道处理。
//! 处理结果只体现在日志和指标中：失败的消息同样被确认，不回队列、不重试，
//! 可靠性依赖消息队列本身的重新投递。

use notifier_shared::config::AppConfig;
use notifier_shared::kafka::{ConsumerMessage, KafkaConsumer};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{NotifierError, Result};
use crate::pipeline::{MessageOutcome, MessagePipeline};
use crate::store::NotificationStore;

/// 通知请求消费者
pub struct NotifierConsumer<S> {
    consumer: KafkaConsumer,
    pipeline: MessagePipeline<S>,
    topic: String,
}

impl<S: NotificationStore> NotifierConsumer<S> {
    pub fn new(config: &AppConfig, pipeline: MessagePipeline<S>) -> Result<Self> {
        let consumer = KafkaConsumer::new(&config.kafka)?;
        Ok(Self {
            consumer,
            pipeline,
            topic: config.kafka.topic.clone(),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let Self {
            consumer,
            pipeline,
            topic,
        } = self;

        consumer.subscribe(&[topic.as_str()])?;
        info!(topic = %topic, "通知消费者已启动");

        consumer
            .start(shutdown, |msg| {
                let pipeline = &pipeline;
                async move {
                    let _ = handle_message(pipeline, &msg).await;
                    Ok(())
                }
            })
            .await;

        info!("通知消费者已停止");
        Ok(())
    }
}

/// 处理单条 Kafka 消息
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需构造完整的 Consumer。
/// 返回处理结果供测试断言，消费循环只依赖其日志副作用。
pub async fn handle_message<S: NotificationStore>(
    pipeline: &MessagePipeline<S>,
    msg: &ConsumerMessage,
) -> Result<MessageOutcome> {
    debug!(
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset,
        payload = msg.payload_str().unwrap_or("<non-utf8>"),
        "收到通知请求"
    );

    let result = pipeline.handle(&msg.payload).await;

    match &result {
        Ok(MessageOutcome::Created(write)) => info!(
            notification_id = %write.notification_id,
            attached = write.attached,
            failed = write.failed,
            offset = msg.offset,
            "通知请求处理完成"
        ),
        Ok(MessageOutcome::Legacy) => info!(offset = msg.offset, "旧版请求已确认"),
        Err(e) => log_failure(e, msg),
    }

    result
}

/// 按错误类别选择日志级别：上游数据问题记 warn，存储故障记 error
fn log_failure(err: &NotifierError, msg: &ConsumerMessage) {
    match err {
        NotifierError::Parse(_)
        | NotifierError::Validation { .. }
        | NotifierError::NoRecipients { .. } => warn!(
            error = %err,
            error_kind = err.kind(),
            partition = msg.partition,
            offset = msg.offset,
            "丢弃通知请求"
        ),
        _ => error!(
            error = %err,
            error_kind = err.kind(),
            partition = msg.partition,
            offset = msg.offset,
            "处理通知请求失败"
        ),
    }
}
