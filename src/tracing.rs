//! Logging and distributed tracing
//!
//! Console logging always goes through `tracing-subscriber`. When an OTLP
//! endpoint is configured, spans (`api_chain`, `llm_call`, `api_request`) are
//! also exported to an OpenTelemetry collector:
//!
//! ```text
//! vmchain → OTLP (gRPC) → OTel Collector → Tempo / Jaeger
//! ```
//!
//! Log levels come from `RUST_LOG` (default `info,vmchain=debug`). Setting
//! `VMCHAIN_LOG_FORMAT=json` switches the console output to JSON lines.

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,vmchain=debug";

/// Environment variable selecting `json` console output
pub const LOG_FORMAT_ENV: &str = "VMCHAIN_LOG_FORMAT";

/// Initialize logging, and OTLP export when `otlp_endpoint` is given.
///
/// # Example
/// ```ignore
/// vmchain::tracing::init_tracing("vmchain", Some("http://localhost:4317"))?;
/// ```
pub fn init_tracing(
    service_name: &str,
    otlp_endpoint: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    match otlp_endpoint {
        Some(endpoint) => tracing::info!(service = service_name, endpoint, "OpenTelemetry tracing initialized"),
        None => tracing::debug!(service = service_name, "Console logging initialized"),
    }

    Ok(())
}

/// Flush pending spans to the collector.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
