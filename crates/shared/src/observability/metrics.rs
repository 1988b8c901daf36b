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

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("achievement_awards_total", "Total number of award attempts");
    metrics::describe_histogram!(
        "achievement_award_duration_seconds",
        "Award duration in seconds"
    );
    metrics::describe_counter!(
        "achievement_progress_updates_total",
        "Total number of progress updates"
    );
    metrics::describe_counter!(
        "achievement_revocations_total",
        "Total number of award revocations"
    );
    metrics::describe_counter!(
        "achievement_outbox_published_total",
        "Total number of outbox events handed to the event sink"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

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
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次颁发尝试
///
/// `source` 区分手动颁发（manual）与进度触发的自动颁发（auto）。
#[inline]
pub fn record_award(source: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "achievement_awards_total",
        "source" => source.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "achievement_award_duration_seconds",
        "source" => source.to_string()
    )
    .record(duration_secs);
}

/// 记录进度更新
#[inline]
pub fn record_progress_update(crossed: bool) {
    metrics::counter!(
        "achievement_progress_updates_total",
        "crossed" => crossed.to_string()
    )
    .increment(1);
}

/// 记录撤销
#[inline]
pub fn record_revocation(status: &str) {
    metrics::counter!("achievement_revocations_total", "status" => status.to_string())
        .increment(1);
}

/// 记录 outbox 投递结果
#[inline]
pub fn record_outbox_publish(status: &str, count: u64) {
    metrics::counter!("achievement_outbox_published_total", "status" => status.to_string())
        .increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("GET", "/api/achievements", 200, 0.1);
        record_award("manual", "success", 0.2);
        record_progress_update(true);
        record_revocation("success");
        record_outbox_publish("published", 3);
        assert!(get_handle().is_none());
    }
}
