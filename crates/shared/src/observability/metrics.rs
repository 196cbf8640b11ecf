//! Prometheus 指标
//!
//! 指标名集中在 [`names`] 中定义；服务代码只调用下方的 `record_*` 函数，
//! 未安装 recorder 时这些调用是空操作。

use std::net::SocketAddr;
use std::sync::OnceLock;

use anyhow::Result;
use axum::{Router, routing::get};
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

pub mod names {
    pub const REDEMPTIONS_TOTAL: &str = "rewards_redemptions_total";
    pub const REDEMPTION_DURATION: &str = "rewards_redemption_duration_seconds";
    pub const COMPENSATIONS_TOTAL: &str = "rewards_compensations_total";
    pub const SCAN_SETTLEMENTS_TOTAL: &str = "rewards_scan_settlements_total";
    pub const LEVEL_UPS_TOTAL: &str = "rewards_level_ups_total";
    pub const STATUS_TRANSITIONS_TOTAL: &str = "rewards_status_transitions_total";
}

/// status 标签的通用取值，业务错误直接使用错误码
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
}

/// 兑换耗时分桶（秒），覆盖单次数据库往返到补偿重试退避
const REDEMPTION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标 HTTP 服务的任务句柄
pub struct MetricsHandle {
    _server: JoinHandle<()>,
}

/// 安装全局 recorder 并在 `metrics_port` 上提供 `/metrics` 与 `/health`
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(names::REDEMPTION_DURATION.to_string()),
            REDEMPTION_BUCKETS,
        )?
        .install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    describe_metrics();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "指标服务已启动");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(handle)).await {
            error!(error = %e, "指标服务异常退出");
        }
    });

    Ok(MetricsHandle { _server: server })
}

fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }))
}

fn describe_metrics() {
    metrics::describe_counter!(
        names::REDEMPTIONS_TOTAL,
        Unit::Count,
        "Redemption attempts by channel and outcome"
    );
    metrics::describe_histogram!(
        names::REDEMPTION_DURATION,
        Unit::Seconds,
        "End-to-end redemption latency including compensation"
    );
    metrics::describe_counter!(
        names::COMPENSATIONS_TOTAL,
        Unit::Count,
        "Compensating credits by resource and outcome"
    );
    metrics::describe_counter!(
        names::SCAN_SETTLEMENTS_TOTAL,
        Unit::Count,
        "Scan settlements by outcome"
    );
    metrics::describe_counter!(
        names::LEVEL_UPS_TOTAL,
        Unit::Count,
        "Settlements that crossed at least one level boundary"
    );
    metrics::describe_counter!(
        names::STATUS_TRANSITIONS_TOTAL,
        Unit::Count,
        "Transaction status transitions"
    );
}

/// 当前进程安装的 handle，未初始化时为 None
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// channel: purchase / cart；status: success 或错误码
pub fn record_redemption(channel: &str, status: &str, duration_secs: f64) {
    let channel = channel.to_string();
    metrics::counter!(
        names::REDEMPTIONS_TOTAL,
        "channel" => channel.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(names::REDEMPTION_DURATION, "channel" => channel).record(duration_secs);
}

/// resource: balance / stock；status 取 [`outcome`] 中的值
pub fn record_compensation(resource: &str, succeeded: bool) {
    let status = if succeeded {
        outcome::SUCCESS
    } else {
        outcome::FAILED
    };
    metrics::counter!(
        names::COMPENSATIONS_TOTAL,
        "resource" => resource.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn record_scan_settlement(status: &str, leveled_up: bool) {
    metrics::counter!(names::SCAN_SETTLEMENTS_TOTAL, "status" => status.to_string()).increment(1);
    if leveled_up {
        metrics::counter!(names::LEVEL_UPS_TOTAL).increment(1);
    }
}

pub fn record_status_transition(from: &str, to: &str) {
    metrics::counter!(
        names::STATUS_TRANSITIONS_TOTAL,
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}
