//! # Configuration Settings
//!
//! Defines the configuration structure for the meridian control plane.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Rebuild holdoff configuration
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    /// Controller identity and watched gateway
    #[validate(nested)]
    pub controller: ControllerConfig,

    /// Snapshot translation settings
    #[validate(nested)]
    pub snapshot: SnapshotConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        self.validate_custom()?;

        Ok(())
    }

    /// Cross-field checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.scheduler.holdoff_max_delay_ms < self.scheduler.holdoff_delay_ms {
            return Err(Error::validation_field(
                "Maximum holdoff must not be shorter than the holdoff delay",
                "scheduler.holdoff_max_delay_ms",
            ));
        }

        if self.controller.gateway_namespace.is_empty() != self.controller.gateway_name.is_empty() {
            return Err(Error::validation_field(
                "Gateway namespace and name must be set together",
                "controller.gateway_name",
            ));
        }

        Ok(())
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    #[validate(range(max = 65535, message = "Metrics port must be <= 65535"))]
    pub metrics_port: u16,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 8000,
            service_name: "meridian".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

/// Debounce windows for DAG rebuilds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period after the last notification before rebuilding
    #[validate(range(min = 1, max = 10000, message = "Holdoff delay must be between 1 and 10000 ms"))]
    pub holdoff_delay_ms: u64,

    /// Upper bound on how long a burst may postpone a rebuild
    #[validate(range(
        min = 1,
        max = 60000,
        message = "Maximum holdoff must be between 1 and 60000 ms"
    ))]
    pub holdoff_max_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { holdoff_delay_ms: 100, holdoff_max_delay_ms: 500 }
    }
}

impl SchedulerConfig {
    pub fn holdoff_delay(&self) -> Duration {
        Duration::from_millis(self.holdoff_delay_ms)
    }

    pub fn holdoff_max_delay(&self) -> Duration {
        Duration::from_millis(self.holdoff_max_delay_ms)
    }
}

/// Controller identity and the gateway it serves
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ControllerConfig {
    /// Value GatewayClasses must carry in `controller` to be owned by us
    #[validate(length(min = 1, message = "Controller name cannot be empty"))]
    pub controller_name: String,

    /// Namespace of the gateway whose routes are programmed
    pub gateway_namespace: String,

    /// Name of the gateway whose routes are programmed
    pub gateway_name: String,

    /// Capacity of each per-kind work queue
    #[validate(range(min = 1, max = 65536, message = "Queue depth must be between 1 and 65536"))]
    pub queue_depth: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: "meridian.dev/gateway-controller".to_string(),
            gateway_namespace: "projectcontour".to_string(),
            gateway_name: "contour".to_string(),
            queue_depth: 1024,
        }
    }
}

/// Settings that shape generated Envoy resources
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Upstream connect timeout in milliseconds
    #[validate(range(min = 1, max = 300000, message = "Connect timeout must be between 1 and 300000 ms"))]
    pub connect_timeout_ms: u64,

    /// DNS suffix used to address Services from the data plane
    #[validate(length(min = 1, message = "Cluster domain cannot be empty"))]
    pub cluster_domain: String,

    /// Port of the plaintext HTTP listener
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub http_listener_port: u32,

    /// Port of the TLS listener
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub https_listener_port: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            cluster_domain: "cluster.local".to_string(),
            http_listener_port: 8080,
            https_listener_port: 8443,
        }
    }
}

impl SnapshotConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
