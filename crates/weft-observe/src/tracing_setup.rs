//! Tracing subscriber initialization for engine hosts.
//!
//! One call wires up structured logging (text or JSON lines) and,
//! optionally, an OpenTelemetry span bridge. The returned guard flushes
//! and shuts down the exporter when dropped, so hosts keep it alive for
//! the life of the process:
//!
//! ```no_run
//! use weft_observe::tracing_setup::{init_tracing, TracingOptions};
//!
//! let _telemetry = init_tracing(TracingOptions::default()).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log line encoding for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines for terminals.
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
}

/// How to set the subscriber up.
///
/// The level filter always comes from `RUST_LOG` via
/// `EnvFilter::from_default_env`.
#[derive(Debug, Clone, Default)]
pub struct TracingOptions {
    pub format: LogFormat,
    /// Bridge tracing spans to OpenTelemetry. Uses a stdout exporter,
    /// suitable for local development; swap for OTLP in production.
    pub export_spans: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("global tracing subscriber already installed: {0}")]
pub struct TracingInitError(String);

/// Keeps the span exporter alive; dropping it flushes pending spans and
/// shuts the provider down.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("span exporter shutdown failed: {e}");
            }
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails when a subscriber is already installed (a second call, or a
/// test harness that set one up first).
pub fn init_tracing(options: TracingOptions) -> Result<TelemetryGuard, TracingInitError> {
    let (otel_layer, guard) = if options.export_spans {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("weft");
        opentelemetry::global::set_tracer_provider(provider.clone());
        (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            TelemetryGuard {
                provider: Some(provider),
            },
        )
    } else {
        (None, TelemetryGuard::default())
    };

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(otel_layer);

    let installed = match options.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };
    installed.map_err(|e| TracingInitError(e.to_string()))?;
    Ok(guard)
}
