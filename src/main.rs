use std::sync::Arc;

use meridian::{
    config::AppConfig,
    observability::{init_observability, log_config_info},
    store::{load_manifests, seed, InMemoryStore},
    ControlPlane, Result, APP_NAME, VERSION,
};
use tokio::signal;
use tracing::{info, warn};

/// Directory of YAML manifests used to seed the in-memory store
const ENV_MANIFEST_DIR: &str = "MERIDIAN_MANIFEST_DIR";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    let metrics = init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting Meridian gateway control plane");
    log_config_info(&config);

    let store = Arc::new(InMemoryStore::new());
    match std::env::var(ENV_MANIFEST_DIR) {
        Ok(dir) => {
            let resources = load_manifests(std::path::Path::new(&dir))?;
            let seeded = seed(store.as_ref(), resources).await?;
            info!(dir = %dir, objects = seeded, "Seeded object store from manifests");
        }
        Err(_) => warn!("{} is not set, starting with an empty object store", ENV_MANIFEST_DIR),
    }

    let plane = ControlPlane::start(&config, store, metrics).await?;

    signal::ctrl_c().await?;
    info!(snapshot_version = plane.snapshots.current_version(), "Received shutdown signal");
    plane.shutdown().await;

    Ok(())
}
