//! # Telemetry Features
//!
//! Console logging through `tracing_subscriber::fmt` is always enabled and
//! filtered by `RUST_LOG` (default `info`). On top of it, this crate supports
//! optional OpenTelemetry export to Honeycomb or stdout.
//!
//! ## Feature matrix
//!
//! - `otel-tracing`: Exports spans through OpenTelemetry.
//! - `otel-metrics`: Exports counters and histograms through OpenTelemetry.
//! - `honeycomb`: Enables the Honeycomb OTLP exporter.
//! - `stdout`: Enables the stdout OTLP exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `otel-tracing` or `otel-metrics`.
//! - Both `honeycomb` and `stdout` exporters can be enabled at the same time.
//!
//! ## Span behavior
//!
//! - Every RPC runs inside a span named after its handler; streaming
//!   producers get a child span that outlives the handler.
//! - Events (`tracing::info!`, etc.) inside a span become span events in
//!   telemetry backends.
//!
//! ## Metrics
//!
//! Every call records `requests` and, on failure, `errors`, both labelled
//! with the `operation`. `calls_inflight` and `call_duration` track call
//! lifetimes (a streaming call lives until its stream ends).
//! `factorial_steps` and `stats_values` count streamed elements. The
//! recording helpers compile to no-ops without `otel-metrics`.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin abacus-tonic-server --features otel-tracing,otel-metrics,stdout
//! ```

// Disallow using `honeycomb` without `otel-tracing` or `otel-metrics`
#[cfg(all(
    feature = "honeycomb",
    not(any(feature = "otel-tracing", feature = "otel-metrics"))
))]
compile_error!(
    "The 'honeycomb' feature requires at least one of 'otel-tracing' or 'otel-metrics' to be enabled."
);

// Disallow using `stdout` without `otel-tracing` or `otel-metrics`
#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-tracing", feature = "otel-metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-tracing' or 'otel-metrics' to be enabled."
);

use abacus_tonic_core::abacus::Operation;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

#[cfg(feature = "otel-tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(feature = "honeycomb")]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "honeycomb", feature = "otel-metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(feature = "honeycomb")]
use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

/// Handles to the OpenTelemetry providers that must be flushed on exit.
///
/// Without any `otel-*` feature this is an empty struct and
/// [`TelemetryProviders::shutdown`] does nothing.
pub struct TelemetryProviders {
    #[cfg(feature = "otel-tracing")]
    tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Errors are printed to stderr
    /// because the subscriber may already be unusable at this point.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global `tracing` subscriber and, when enabled, the
/// OpenTelemetry tracer and meter providers.
///
/// # Errors
///
/// Returns an error if an exporter cannot be configured (e.g. missing
/// Honeycomb environment variables).
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
    let scope = InstrumentationScope::builder("abacus")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Human-readable console output. Unrelated to the `opentelemetry_stdout`
    // exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel-tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        let _ = INSTRUMENTS.set(Instruments::new(&meter));

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-tracing")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("abacus")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

/// Connection settings shared by the Honeycomb span and metric exporters.
#[cfg(feature = "honeycomb")]
struct HoneycombSettings {
    endpoint: String,
    compression: Compression,
    metadata: MetadataMap,
}

#[cfg(feature = "honeycomb")]
impl HoneycombSettings {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?
                .parse()
                .context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?
                .parse()
                .context("invalid dataset")?,
        );

        let compression =
            Compression::from_str(&var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?;

        Ok(Self {
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression,
            metadata,
        })
    }
}

#[cfg(feature = "otel-metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let settings = HoneycombSettings::from_env()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(settings.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-tracing")]
fn batch_config() -> sdktrace::BatchConfig {
    sdktrace::BatchConfigBuilder::default()
        .with_scheduled_delay(std::time::Duration::from_secs(5))
        .with_max_queue_size(2048)
        .build()
}

#[cfg(feature = "otel-tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(batch_config())
            .build();
        builder.with_span_processor(batch)
    };

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let settings = HoneycombSettings::from_env()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(settings.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(batch_config())
            .build();
        builder.with_span_processor(batch)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-metrics")]
struct Instruments {
    requests: Counter<u64>,
    errors: Counter<u64>,
    calls_inflight: UpDownCounter<i64>,
    call_duration_ms: Histogram<f64>,
    factorial_steps: Counter<u64>,
    stats_values: Counter<u64>,
}

#[cfg(feature = "otel-metrics")]
static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("requests")
                .with_description("Total calls admitted, by operation")
                .build(),
            errors: meter
                .u64_counter("errors")
                .with_description("Failed or refused calls, by operation")
                .build(),
            calls_inflight: meter
                .i64_up_down_counter("calls_inflight")
                .with_description("Calls currently being served")
                .build(),
            call_duration_ms: meter
                .f64_histogram("call_duration")
                .with_unit("ms")
                .with_description("End-to-end call duration, including streams")
                .build(),
            factorial_steps: meter
                .u64_counter("factorial_steps")
                .with_description("Factorial steps delivered to clients")
                .build(),
            stats_values: meter
                .u64_counter("stats_values")
                .with_description("Values folded into statistics accumulators")
                .build(),
        }
    }
}

#[cfg(feature = "otel-metrics")]
fn operation_label(operation: Operation) -> [KeyValue; 1] {
    [KeyValue::new("operation", operation.as_str())]
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "otel-metrics")]
pub fn increment_requests(operation: Operation) {
    if let Some(i) = INSTRUMENTS.get() {
        i.requests.add(1, &operation_label(operation));
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_requests(_operation: Operation) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_errors(operation: Operation) {
    if let Some(i) = INSTRUMENTS.get() {
        i.errors.add(1, &operation_label(operation));
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_errors(_operation: Operation) {}

#[cfg(feature = "otel-metrics")]
pub fn add_calls_inflight(delta: i64) {
    if let Some(i) = INSTRUMENTS.get() {
        i.calls_inflight.add(delta, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn add_calls_inflight(_delta: i64) {}

#[cfg(feature = "otel-metrics")]
pub fn record_call_duration(operation: Operation, duration_ms: f64) {
    if let Some(i) = INSTRUMENTS.get() {
        i.call_duration_ms
            .record(duration_ms, &operation_label(operation));
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_call_duration(_operation: Operation, _duration_ms: f64) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_factorial_steps() {
    if let Some(i) = INSTRUMENTS.get() {
        i.factorial_steps.add(1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_factorial_steps() {}

#[cfg(feature = "otel-metrics")]
pub fn increment_stats_values() {
    if let Some(i) = INSTRUMENTS.get() {
        i.stats_values.add(1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_stats_values() {}
