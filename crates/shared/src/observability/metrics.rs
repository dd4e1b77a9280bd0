//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    /// 停止指标 HTTP 服务
    pub fn shutdown(self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health`。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!(
        "discount_codes_issued_total",
        "Total number of discount codes persisted"
    );
    metrics::describe_counter!(
        "discount_issuance_write_conflicts_total",
        "Batch inserts rejected by the unique constraint"
    );
    metrics::describe_counter!(
        "discount_issuance_requests_total",
        "Total number of issuance requests by outcome"
    );
    metrics::describe_histogram!(
        "discount_issuance_duration_seconds",
        "Issuance request duration in seconds"
    );
    metrics::describe_counter!(
        "discount_redemptions_total",
        "Total number of redemption attempts by result"
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

// ============================================================================
// 业务指标记录
// ============================================================================

/// 记录一批折扣码落库
#[inline]
pub fn record_codes_issued(count: u64) {
    metrics::counter!("discount_codes_issued_total").increment(count);
}

/// 记录批量写入时的唯一键冲突
#[inline]
pub fn record_write_conflict(attempt: u32) {
    metrics::counter!(
        "discount_issuance_write_conflicts_total",
        "attempt" => attempt.to_string()
    )
    .increment(1);
}

/// 记录一次发放请求
#[inline]
pub fn record_issuance(status: &str, duration_secs: f64) {
    metrics::counter!("discount_issuance_requests_total", "status" => status.to_string())
        .increment(1);
    metrics::histogram!("discount_issuance_duration_seconds", "status" => status.to_string())
        .record(duration_secs);
}

/// 记录一次核销结果
#[inline]
pub fn record_redemption(result: &str) {
    metrics::counter!("discount_redemptions_total", "result" => result.to_string()).increment(1);
}
