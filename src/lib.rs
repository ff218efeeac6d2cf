//! # Meridian
//!
//! Gateway control plane that turns Gateway API routing intent into
//! versioned Envoy configuration snapshots.
//!
//! ## Architecture
//!
//! ```text
//! Object Store → Pipeline → Resource Cache → Holdoff Scheduler → DAG Builder → Snapshot Cache → Observers
//!                   ↓
//!              Reconcilers → Validators → Status Cache → Object Store
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use meridian::{config::AppConfig, store::InMemoryStore, ControlPlane, MetricsRecorder, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let store = Arc::new(InMemoryStore::new());
//!     let plane = ControlPlane::start(&config, store, MetricsRecorder::new()).await?;
//!     println!("snapshot version {}", plane.snapshots.current_version());
//!     plane.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod controller;
pub mod dag;
pub mod domain;
pub mod equality;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod provision;
pub mod scheduler;
pub mod startup;
pub mod status;
pub mod store;
pub mod validation;
pub mod xds;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};
pub use observability::{init_observability, MetricsRecorder};
pub use startup::ControlPlane;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
