//! 可观测性
//!
//! 日志、分布式追踪与 Prometheus 指标共用一个入口初始化，
//! 指标名称集中定义在 [`metrics`] 中，各服务只调用记录函数。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub service_name: String,

    /// OTLP gRPC 端点，为空时不导出 span
    pub otlp_endpoint: Option<String>,

    /// span 采样比例，取值 [0, 1]
    pub trace_sample_ratio: f64,

    pub metrics_enabled: bool,
    pub metrics_port: u16,

    /// 默认日志级别，RUST_LOG 存在时以其为准
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            otlp_endpoint: None,
            trace_sample_ratio: 1.0,
            metrics_enabled: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }
}

/// 持有追踪 provider 与指标服务的生命周期，drop 时刷新待导出的 span
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
    _tracing_guard: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 不持有任何资源，供测试或关闭可观测性时使用
    pub fn empty() -> Self {
        Self {
            _metrics_handle: None,
            _tracing_guard: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self._tracing_guard.is_some() {
            info!("Shutting down observability...");
        }
    }
}

/// 先初始化日志，再按配置启动指标端点
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;

    let metrics_handle = match config.metrics_enabled {
        true => Some(metrics::init(config).await?),
        false => None,
    };

    info!(
        service = %config.service_name,
        metrics_port = ?config.metrics_enabled.then_some(config.metrics_port),
        otlp_endpoint = ?config.otlp_endpoint,
        sample_ratio = config.trace_sample_ratio,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
        _tracing_guard: Some(tracing_guard),
    })
}
