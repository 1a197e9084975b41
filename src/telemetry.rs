//! Logging and metric export setup
//!
//! Logs are always JSON on stdout, filtered by `RUST_LOG`. Traces and metrics
//! leave the process only when an OTLP endpoint is configured; the resource
//! they carry names the installation the collector reports on.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ProviderParams;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,azure_collector=debug,kube=info,tower=warn,hyper=warn";

/// Errors raised while installing telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// An OTLP exporter could not be built
    #[error("failed to build OTLP {signal} exporter: {message}")]
    Exporter {
        /// `traces` or `metrics`
        signal: &'static str,
        /// Exporter error
        message: String,
    },

    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Telemetry settings
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to exported traces and metrics
    pub service_name: String,
    /// OTLP gRPC endpoint (e.g. "http://otel-collector:4317"); logs only when unset
    pub otlp_endpoint: Option<String>,
    /// Installation scope, attached as resource attributes
    pub provider: ProviderParams,
}

impl TelemetryConfig {
    /// Settings for this binary reporting on `provider`
    ///
    /// The endpoint comes from `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn for_provider(provider: ProviderParams) -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|e| !e.is_empty()),
            provider,
        }
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("cloud.provider", "azure"),
        ];
        let scope = [
            ("cloud.region", &self.provider.location),
            ("azure.resource_group", &self.provider.resource_group),
            ("azure.tenant_id", &self.provider.tenant_id),
        ];
        for (key, value) in scope {
            if !value.is_empty() {
                attributes.push(KeyValue::new(key, value.clone()));
            }
        }
        if let Ok(pod_name) = std::env::var("POD_NAME") {
            attributes.push(KeyValue::new("k8s.pod.name", pod_name));
        }
        Resource::new(attributes)
    }
}

/// Install the global subscriber, plus the OTLP providers when configured
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            global::set_text_map_propagator(TraceContextPropagator::new());
            let tracer = install_otlp(endpoint, config.resource())?
                .tracer(config.service_name.clone());
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Span list carries the collector set a line belongs to
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

/// Register OTLP meter and tracer providers, returning the tracer provider
fn install_otlp(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let metrics = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "metrics",
            message: e.to_string(),
        })?;
    let spans = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "traces",
            message: e.to_string(),
        })?;

    global::set_meter_provider(
        SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(metrics, runtime::Tokio).build())
            .with_resource(resource.clone())
            .build(),
    );

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(spans, runtime::Tokio)
        .with_resource(resource)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider)
}
