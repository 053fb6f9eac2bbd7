pub mod meter;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::error::Error;
use std::time::Duration;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

//KNOWN ISSUES:
// - OpenTelemetry log appender doesn't contain trace-id and attributes from the span

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub service_name: String,
    #[serde(default)]
    pub logs: EnvFilterConfig,
    #[serde(default)]
    pub traces: EnvFilterConfig,
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for EnvFilterConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            filters: vec![],
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OtlpConfig {
    pub url: String,
}

impl TryFrom<&EnvFilterConfig> for EnvFilter {
    type Error = tracing_subscriber::filter::ParseError;

    fn try_from(config: &EnvFilterConfig) -> Result<Self, Self::Error> {
        //default level is kept as a directive, the builder drops it as soon as filters are given
        let directives: Vec<&str> = std::iter::once(config.default_level.as_str())
            .chain(config.filters.iter().map(String::as_str))
            .collect();

        EnvFilter::builder()
            .with_default_directive(config.default_level.parse()?)
            .parse(directives.join(","))
    }
}

impl MonitoringConfig {
    /// Installs the global tracing subscriber. Console logging is always on;
    /// logs, traces and metrics are additionally exported when `otlp` is set.
    pub fn init(&self) -> Result<(), Box<dyn Error>> {
        let Some(otlp) = &self.otlp else {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::try_from(&self.logs)?))
                .init();
            return Ok(());
        };

        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::default());

        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
            .build();

        let logger_provider = otlp_logs(resource.clone(), &otlp.url)?;
        let logging_layer =
            OpenTelemetryTracingBridge::new(&logger_provider).with_filter(EnvFilter::try_from(&self.logs)?);

        let tracer = otlp_traces(resource.clone(), &otlp.url)?.tracer(self.service_name.clone());
        let tracing_layer = OpenTelemetryLayer::new(tracer).with_filter(EnvFilter::try_from(&self.traces)?);

        opentelemetry::global::set_meter_provider(otlp_metrics(resource, &otlp.url)?);

        tracing_subscriber::registry()
            .with(tracing_layer)
            .with(logging_layer)
            .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::try_from(&self.logs)?))
            .init();

        Ok(())
    }
}

fn otlp_traces(resource: Resource, url: &str) -> Result<SdkTracerProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build())
}

fn otlp_metrics(resource: Resource, url: &str) -> Result<SdkMeterProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(15))
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

fn otlp_logs(resource: Resource, url: &str) -> Result<SdkLoggerProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_env_filter_from_config() {
        let config = EnvFilterConfig {
            default_level: "warn".to_string(),
            filters: vec!["pvdimmer_bridge=debug".to_string(), "rumqttc=error".to_string()],
        };

        let filter = EnvFilter::try_from(&config).unwrap().to_string();

        assert!(filter.contains("pvdimmer_bridge=debug"));
        assert!(filter.contains("rumqttc=error"));
        assert!(filter.contains("warn"));
    }

    #[test]
    fn keeps_default_level_without_filters() {
        let filter = EnvFilter::try_from(&EnvFilterConfig::default()).unwrap().to_string();

        assert!(filter.contains("info"));
    }
}
