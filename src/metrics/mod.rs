//! Centralized metrics for the reporting pipeline
//!
//! Each phase defines its own metrics in a dedicated submodule so names stay
//! consistent and owned by one place. The Prometheus recorder is installed
//! once per process; the HTTP server renders it at `/metrics`.

pub mod dashboard;
pub mod ingestion;

pub use dashboard::DashboardMetrics;
pub use ingestion::IngestionMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register every phase's metrics.
///
/// Idempotent. Returns `false` when another recorder already owns the
/// global slot, in which case metric calls are silently dropped.
pub fn init_metrics() -> bool {
    if HANDLE.get().is_some() {
        return true;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Metrics handle was already stored");
            }
            register_all_metrics();
            info!("Prometheus recorder installed");
            true
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            false
        }
    }
}

/// Prometheus text exposition of everything recorded so far.
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Per-phase metric collection
pub trait PhaseMetrics {
    /// Pre-register every metric so it shows up before its first event.
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Builds `retail_pulse_{phase}_{name}` names, suffixing counters with `_total`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("retail_pulse_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("retail_pulse_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

fn register_all_metrics() {
    let mut count = 0;
    count += register_phase::<IngestionMetrics>();
    count += register_phase::<DashboardMetrics>();
    info!("Registered {} metrics", count);
}

fn register_phase<T: PhaseMetrics>() -> usize {
    T::register_metrics();
    let docs = T::metrics_documentation();
    for doc in &docs {
        match doc.metric_type {
            MetricType::Counter => metrics::describe_counter!(doc.name, doc.help),
            MetricType::Histogram => metrics::describe_histogram!(doc.name, doc.help),
        }
    }
    info!("Registered {} metrics for phase '{}'", docs.len(), T::phase_name());
    docs.len()
}
