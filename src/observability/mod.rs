//! # Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics through the
//! `metrics` facade.

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::log_config_info;
pub use metrics::{init_metrics, MetricsRecorder};
pub use tracing::init_tracing;

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize all observability components
pub fn init_observability(config: &ObservabilityConfig) -> Result<MetricsRecorder> {
    init_tracing(config)?;

    if config.enable_metrics {
        init_metrics(config)?;
    }

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );

    Ok(MetricsRecorder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_observability_without_metrics() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };

        // A global subscriber may already be installed by another test.
        assert!(init_observability(&config).is_ok());
    }
}
