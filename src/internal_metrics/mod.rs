//! # Internal Metrics Module
//!
//! Registers descriptions for every metric the collector and liveness loop
//! emit and installs the Prometheus recorder whose handle the control
//! server renders on `/metrics`.
//!
//! Call sites use the `metrics` macros directly; when no recorder is
//! installed they are no-ops.

use crate::config::MetricsConfig;
use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info};

/// Registers descriptions for all metrics with the global recorder.
pub fn describe() {
    metrics::describe_counter!("collector_cycles_total", Unit::Count, "Collection cycles run, labeled by outcome (written, skipped, failed).");
    metrics::describe_gauge!("directory_size_bytes", Unit::Bytes, "Last measured size of each tracked directory, labeled by folder.");
    metrics::describe_counter!("size_entry_errors_total", Unit::Count, "Filesystem entries that could not be read while measuring.");
    metrics::describe_counter!("sink_writes_total", Unit::Count, "Batch writes to the sink, labeled by status.");
    metrics::describe_gauge!("resource_health_status", Unit::Count, "Health of each polled resource (1 for online, 0 otherwise).");
    metrics::describe_counter!("active_resource_changes_total", Unit::Count, "Number of times the active resource changed.");
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder and returns its render handle.
    ///
    /// Returns `None` when metrics are disabled or a global recorder is
    /// already installed in this process.
    pub fn build(self) -> Option<PrometheusHandle> {
        if !self.config.enabled {
            return None;
        }

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!(error = %e, "Failed to install Prometheus recorder");
            return None;
        }

        describe();
        info!("Prometheus recorder installed");
        Some(handle)
    }
}
