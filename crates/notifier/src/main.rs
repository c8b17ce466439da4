//! 通知分发服务
//!
//! 消费 service_notifier 队列中的通知请求并写入通知表。

use std::sync::Arc;

use anyhow::Result;
use notifier::consumer::NotifierConsumer;
use notifier::pipeline::MessagePipeline;
use notifier::store::PgStore;
use notifier_shared::{config::AppConfig, database, observability};
use tokio::{signal, sync::watch};
use tracing::{info, warn};

const SERVICE_NAME: &str = "notifier";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载 .env 与分层配置
    let _ = dotenvy::dotenv();
    let config = AppConfig::load(SERVICE_NAME)?;

    // 2. 初始化日志与指标
    let _guard = observability::init(&config.observability, &config.service_name).await?;
    info!(
        environment = %config.environment,
        topic = %config.kafka.topic,
        "Starting notifier..."
    );

    // 3. 初始化数据库连接池，由存储持有
    let pool = database::connect(&config.database).await?;
    let store = Arc::new(PgStore::new(pool));

    // 4. 组装消息管道与消费者
    let pipeline = MessagePipeline::new(store.clone());
    let consumer = NotifierConsumer::new(&config, pipeline)?;

    // 5. Ctrl-C 时通知消费循环退出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "监听关闭信号失败");
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;

    store.close().await;
    info!("Notifier stopped");
    Ok(())
}
