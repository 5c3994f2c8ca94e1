/*!
Logging setup and Prometheus instrumentation for tablesnap.

Metrics are only compiled in with the `metrics` feature. The recording
helpers are free functions so call sites need a single `#[cfg]` line.
*/

#[cfg(feature = "metrics")]
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, TableSnapError};

/// Filter directive applied when `RUST_LOG` is not set
pub const DEFAULT_LOG_DIRECTIVE: &str = "tablesnap=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<TableSnapMetrics>> = OnceLock::new();

/// Counters and histograms for store traffic
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct TableSnapMetrics {
    pub scan_pages_total: IntCounter,
    pub records_scanned_total: IntCounter,
    pub records_written_total: IntCounter,
    pub store_errors_total: IntCounter,
    pub store_latency_seconds: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl TableSnapMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let scan_pages_total = counter(
            &registry,
            "tablesnap_scan_pages_total",
            "Scan pages fetched from the record store",
        )?;
        let records_scanned_total = counter(
            &registry,
            "tablesnap_records_scanned_total",
            "Records read by table scans",
        )?;
        let records_written_total = counter(
            &registry,
            "tablesnap_records_written_total",
            "Records written by restores",
        )?;
        let store_errors_total = counter(
            &registry,
            "tablesnap_store_errors_total",
            "Record store calls that failed after retries",
        )?;

        let store_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "tablesnap_store_latency_seconds",
            "Duration of record store calls in seconds",
        ))
        .map_err(|e| metric_error("tablesnap_store_latency_seconds", e))?;
        registry
            .register(Box::new(store_latency_seconds.clone()))
            .map_err(|e| metric_error("tablesnap_store_latency_seconds", e))?;

        Ok(Self {
            scan_pages_total,
            records_scanned_total,
            records_written_total,
            store_errors_total,
            store_latency_seconds,
            registry,
        })
    }

    /// The process-wide metrics, or `None` if registration failed
    pub fn global() -> Option<&'static TableSnapMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!(error = %e, "Metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    /// Render every registered metric in the Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| TableSnapError::validation(format!("Failed to encode metrics: {e}")))
    }
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help).map_err(|e| metric_error(name, e))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| metric_error(name, e))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> TableSnapError {
    TableSnapError::validation(format!("Failed to register {name}: {e}"))
}

/// One scan page of `records` records was fetched
#[cfg(feature = "metrics")]
pub fn record_scan_page(records: usize) {
    if let Some(metrics) = TableSnapMetrics::global() {
        metrics.scan_pages_total.inc();
        metrics.records_scanned_total.inc_by(records as u64);
    }
}

/// A restore committed `records` records
#[cfg(feature = "metrics")]
pub fn record_records_written(records: usize) {
    if let Some(metrics) = TableSnapMetrics::global() {
        metrics.records_written_total.inc_by(records as u64);
    }
}

/// A store call finished after `elapsed`
#[cfg(feature = "metrics")]
pub fn record_store_call(elapsed: Duration, ok: bool) {
    if let Some(metrics) = TableSnapMetrics::global() {
        metrics.store_latency_seconds.observe(elapsed.as_secs_f64());
        if !ok {
            metrics.store_errors_total.inc();
        }
    }
}

/// Prometheus text for the global metrics, empty when metrics are unavailable
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> Result<String> {
    match TableSnapMetrics::global() {
        Some(metrics) => metrics.gather_metrics(),
        None => Ok(String::new()),
    }
}

/// Install a JSON tracing subscriber filtered by `RUST_LOG` plus `directive`
///
/// # Errors
/// * `TableSnapError::Validation` - `directive` does not parse or a global
///   subscriber is already installed
pub fn init_observability(directive: &str) -> Result<()> {
    #[cfg(feature = "metrics")]
    TableSnapMetrics::global();

    let directive = directive.parse::<Directive>().map_err(|e| {
        TableSnapError::validation(format!("Invalid log directive '{directive}': {e}"))
    })?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(false);

    let subscriber = TracingRegistry::default()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(fmt_layer);

    set_global_default(subscriber).map_err(|e| {
        TableSnapError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("tablesnap observability initialized");
    Ok(())
}

/// [`init_observability`] with [`DEFAULT_LOG_DIRECTIVE`]
pub fn init_default_observability() -> Result<()> {
    init_observability(DEFAULT_LOG_DIRECTIVE)
}
