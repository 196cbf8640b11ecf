//! 日志与分布式追踪初始化
//!
//! 控制台输出支持文本与 JSON 两种格式；配置了 OTLP 端点时额外挂载
//! OpenTelemetry 层，按采样比例导出 span。

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{Sampler, SdkTracerProvider},
};
use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// sqlx 在 info 级别会逐条打印语句，默认压到 warn
const QUIET_DIRECTIVES: &[&str] = &["sqlx=warn", "h2=warn", "tower=warn"];

/// 持有 TracerProvider，Drop 时刷新尚未导出的 span
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Error shutting down tracer provider: {:?}", e);
        }
    }
}

/// 构造日志过滤器
///
/// RUST_LOG 优先；否则使用配置的 log_level 并附加降噪指令，非法级别回退到 info
pub fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directives = std::iter::once(log_level)
        .chain(QUIET_DIRECTIVES.iter().copied())
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &ObservabilityConfig) -> Result<TracingGuard> {
    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => Some(init_tracer_provider(
            &config.service_name,
            endpoint,
            config.trace_sample_ratio,
        )?),
        None => None,
    };
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(build_filter(&config.log_level))
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(TracingGuard { provider })
}

/// 采样比例钳制到 [0, 1]，非法值按全量采样处理
fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn sampler_for(ratio: f64) -> Sampler {
    let ratio = clamp_ratio(ratio);
    if ratio >= 1.0 {
        Sampler::ParentBased(Box::new(Sampler::AlwaysOn))
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
    }
}

fn init_tracer_provider(
    service_name: &str,
    endpoint: &str,
    sample_ratio: f64,
) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(sampler_for(sample_ratio))
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
