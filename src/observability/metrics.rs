//! # Metrics Collection
//!
//! Prometheus metrics for the rebuild, publish and reconcile paths.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks control plane activity
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a change notification entering the pipeline
    pub fn record_notification(&self, kind: &str, event: &str) {
        let labels = [("kind", kind.to_string()), ("event", event.to_string())];
        counter!("meridian_notifications_total", &labels).increment(1);
    }

    /// Record a completed DAG rebuild
    pub fn record_rebuild(&self, coalesced: u64, duration: f64) {
        counter!("meridian_dag_rebuilds_total").increment(1);
        counter!("meridian_dag_coalesced_notifications_total").increment(coalesced);
        histogram!("meridian_dag_rebuild_duration_seconds").record(duration);
    }

    /// Record a published snapshot and its per-collection sizes
    pub fn record_snapshot(&self, version: u64, sizes: &[(&str, usize)]) {
        gauge!("meridian_snapshot_version").set(version as f64);
        for (type_url, size) in sizes {
            let labels = [("type_url", type_url.to_string())];
            gauge!("meridian_snapshot_resources", &labels).set(*size as f64);
        }
    }

    /// Record an observer that failed to accept a snapshot
    pub fn record_observer_failure(&self, observer: &str) {
        let labels = [("observer", observer.to_string())];
        counter!("meridian_observer_failures_total", &labels).increment(1);
    }

    /// Record a status commit outcome
    pub fn record_status_commit(&self, kind: &str, outcome: &str) {
        let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
        counter!("meridian_status_commits_total", &labels).increment(1);
    }

    /// Record a reconcile outcome and its duration
    pub fn record_reconcile(&self, kind: &str, outcome: &str, duration: f64) {
        let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
        counter!("meridian_reconciles_total", &labels).increment(1);

        let duration_labels = [("kind", kind.to_string())];
        histogram!("meridian_reconcile_duration_seconds", &duration_labels).record(duration);
    }

    /// Register metric descriptions with the exporter
    pub fn register_descriptions(&self) {
        describe_counter!(
            "meridian_notifications_total",
            Unit::Count,
            "Change notifications received from the object store"
        );
        describe_counter!("meridian_dag_rebuilds_total", Unit::Count, "Completed DAG rebuilds");
        describe_counter!(
            "meridian_dag_coalesced_notifications_total",
            Unit::Count,
            "Notifications folded into rebuilds"
        );
        describe_histogram!(
            "meridian_dag_rebuild_duration_seconds",
            Unit::Seconds,
            "Time spent building and publishing one DAG"
        );
        describe_gauge!("meridian_snapshot_version", "Version of the current snapshot");
        describe_gauge!("meridian_snapshot_resources", "Resources per snapshot collection");
        describe_counter!(
            "meridian_observer_failures_total",
            Unit::Count,
            "Snapshot observers that returned an error"
        );
        describe_counter!("meridian_status_commits_total", Unit::Count, "Status commit outcomes");
        describe_counter!("meridian_reconciles_total", Unit::Count, "Reconcile outcomes");
        describe_histogram!(
            "meridian_reconcile_duration_seconds",
            Unit::Seconds,
            "Time spent in one reconcile"
        );
    }
}

/// Initialize the Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_descriptions();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "Metrics exporter started");

    Ok(())
}
