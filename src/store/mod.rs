//! # Object Store Adapter
//!
//! Contract for the cluster object store the control plane reads from and
//! writes status and owned objects back to. [`InMemoryStore`] implements it
//! for tests and standalone runs.

pub mod manifest;
pub mod memory;

pub use manifest::{load_manifests, parse_json_manifest, parse_manifests, seed};
pub use memory::InMemoryStore;

use crate::domain::{NamespacedName, Resource, ResourceKind};
use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Updated,
    Deleted,
}

impl WatchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Change notification for one resource
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub resource: Arc<Resource>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object; `Error::NotFound` when absent
    async fn get(&self, kind: ResourceKind, key: &NamespacedName) -> Result<Resource>;

    /// List objects of `kind`, optionally restricted to one namespace
    async fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Vec<Resource>>;

    async fn create(&self, resource: Resource) -> Result<Resource>;

    /// Replace spec and metadata. Status is left untouched.
    async fn update(&self, resource: Resource) -> Result<Resource>;

    /// Replace status only
    async fn update_status(&self, resource: Resource) -> Result<Resource>;

    async fn delete(&self, kind: ResourceKind, key: &NamespacedName) -> Result<()>;

    /// Subscribe to change notifications for every kind
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
