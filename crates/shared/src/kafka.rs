//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Consumer 抽象，
//! 统一错误映射、位点提交和优雅关闭语义。
//!
//! 位点在 handler 返回之后才提交，因此进程在处理中途退出时消息会被重新投递，
//! 即至少一次（at-least-once）语义，下游处理必须能容忍重复执行。

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::SharedError;

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp: msg.timestamp().to_millis(),
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, SharedError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| SharedError::Kafka(format!("负载非 UTF-8 编码: {e}")))
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义。
/// 关闭自动提交，由消费循环在每条消息处理完成后手动提交位点。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者
    pub fn new(config: &KafkaConfig) -> Result<Self, SharedError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| SharedError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), SharedError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| SharedError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler 处理；handler 返回错误只记录日志而不中断循环。
    ///   无论成功与否，handler 返回后都提交该消息的位点（确认消费）。
    /// - 关闭信号变为 `true` 时退出循环，正在执行的 handler 会自然完成。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), SharedError>>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    match msg_result {
                        Ok(borrowed_msg) => {
                            let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                            debug!(
                                topic = %msg.topic,
                                partition = msg.partition,
                                offset = msg.offset,
                                "收到 Kafka 消息"
                            );

                            if let Err(e) = handler(msg).await {
                                error!(error = %e, "处理 Kafka 消息失败");
                            }

                            if let Err(e) = self
                                .consumer
                                .commit_message(&borrowed_msg, CommitMode::Async)
                            {
                                // 提交失败时该消息会被重新投递
                                warn!(
                                    error = %e,
                                    partition = borrowed_msg.partition(),
                                    offset = borrowed_msg.offset(),
                                    "提交消费位点失败"
                                );
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
