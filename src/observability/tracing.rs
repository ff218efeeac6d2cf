//! # Log Subscriber
//!
//! Installs the global `tracing` subscriber.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. An already
/// installed global subscriber is left in place.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let result = if config.json_logging {
        ::tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .json()
                .with_current_span(true)
                .finish(),
        )
    } else {
        ::tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).with_target(true).finish(),
        )
    };

    if result.is_err() {
        ::tracing::debug!("Global tracing subscriber already installed");
    }

    Ok(())
}
