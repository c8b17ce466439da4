//! 统一可观测性模块
//!
//! 提供日志与指标的统一初始化和管理。
//! 服务通过单一入口点配置可观测性，确保一致的日志字段和指标命名。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有指标服务器的生命周期，进程退出前保持存活。
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（Prometheus 指标，可通过配置关闭）
///
/// # Example
///
/// ```ignore
/// use notifier_shared::config::AppConfig;
/// use notifier_shared::observability;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::load("notifier")?;
///     let _guard = observability::init(&config.observability, &config.service_name).await?;
///     Ok(())
/// }
/// ```
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config, service_name).await?)
    } else {
        None
    };

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
    })
}
