//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health` 端点。
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通知分发相关指标的描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "notifier_messages_total",
        "Total number of consumed notification messages by kind and outcome"
    );
    metrics::describe_histogram!(
        "notifier_message_duration_seconds",
        "Notification message processing duration in seconds"
    );
    metrics::describe_counter!(
        "notifier_recipients_attached_total",
        "Total number of recipient rows attached to notifications"
    );
    metrics::describe_counter!(
        "notifier_recipient_attach_failures_total",
        "Total number of recipient rows that failed to attach"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一条消息的处理结果
///
/// `kind` 为消息类型（vuln_summary / package_update / legacy / unknown），
/// `outcome` 为处理结果（created / legacy 或错误类别）
#[inline]
pub fn record_message(kind: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "notifier_messages_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "notifier_message_duration_seconds",
        "kind" => kind.to_string()
    )
    .record(duration_secs);
}

/// 记录收件人关联结果
#[inline]
pub fn record_recipients(attached: usize, failed: usize) {
    metrics::counter!("notifier_recipients_attached_total").increment(attached as u64);
    if failed > 0 {
        metrics::counter!("notifier_recipient_attach_failures_total").increment(failed as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_message("vuln_summary", "created", 0.05);
        record_message("unknown", "parse_failure", 0.001);
        record_recipients(3, 0);
        record_recipients(1, 2);
    }
}
