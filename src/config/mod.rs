//! # Configuration Management
//!
//! Configuration is assembled from built-in defaults overlaid with
//! `MERIDIAN_*` environment variables. Nested keys use a double underscore,
//! e.g. `MERIDIAN_SCHEDULER__HOLDOFF_DELAY_MS=250`.

pub mod settings;

pub use settings::{AppConfig, ControllerConfig, ObservabilityConfig, SchedulerConfig, SnapshotConfig};

use crate::errors::Result;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "MERIDIAN";

impl AppConfig {
    /// Load configuration from defaults and the process environment
    pub fn from_env() -> Result<Self> {
        let loaded: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }
}
