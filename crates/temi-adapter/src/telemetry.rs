//! Tracing pipeline initialisation for the adapter.
//!
//! Call [`init_tracing`] once at process startup and hold the returned guard
//! for the lifetime of the process.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set, spans are exported over OTLP/HTTP. |
//! | `RUST_LOG` | Log filter; overrides `[log] level`. |
//! | `TEMI_LOG_FORMAT=json` | Newline-delimited JSON logs; applied through the config loader. |
//!
//! ```rust,no_run
//! let cfg = temi_adapter::config::AdapterConfig::default();
//! let _guard = temi_adapter::telemetry::init_tracing("temi-adapter", &cfg.log);
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogConfig, LogFormat};

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `log.level`.  Output is
/// compact text or JSON per `log.format`.  Calling this twice leaves the first
/// subscriber in place.
pub fn init_tracing(service_name: &str, log: &LogConfig) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let use_json = log.format == LogFormat::Json;

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("temi")));

    let json_layer = use_json.then(|| tracing_subscriber::fmt::layer().json());
    let compact_layer = (!use_json).then(|| tracing_subscriber::fmt::layer().compact());

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
    {
        eprintln!("[temi] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[temi] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Exporter failures are printed to stderr and yield `None`.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[temi] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: the CLI initialises tracing before its runtime starts.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
