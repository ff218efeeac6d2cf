//! In-memory object store with generation and resource-version semantics.

use super::{ObjectStore, WatchEvent, WatchEventType};
use crate::domain::{NamespacedName, Resource, ResourceKind};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

const WATCH_CAPACITY: usize = 1024;

type ObjectKey = (ResourceKind, NamespacedName);

/// Store keyed by kind and namespace/name.
///
/// `generation` increments on spec changes only; `resource_version`
/// increments on every write and is checked on update when non-zero.
/// Deleting an object that still carries finalizers marks it deleting and
/// it is removed once an update clears the last finalizer.
#[derive(Debug)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<ObjectKey, Resource>>,
    resource_version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self { objects: RwLock::new(BTreeMap::new()), resource_version: AtomicU64::new(0), events }
    }

    fn next_version(&self) -> u64 {
        self.resource_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, event_type: WatchEventType, resource: &Resource) {
        // No receivers is fine; the pipeline lists on start.
        let _ = self.events.send(WatchEvent { event_type, resource: Arc::new(resource.clone()) });
    }

    fn check_version(stored: &Resource, incoming: &Resource) -> Result<()> {
        let want = incoming.meta().resource_version;
        let have = stored.meta().resource_version;
        if want != 0 && want != have {
            return Err(Error::conflict(format!(
                "{} {} has resource version {}, write was based on {}",
                stored.kind(),
                stored.key(),
                have,
                want
            )));
        }
        Ok(())
    }

    /// Number of stored objects of `kind`
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.objects.read().expect("object store lock poisoned").keys().filter(|(k, _)| *k == kind).count()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: ResourceKind, key: &NamespacedName) -> Result<Resource> {
        self.objects
            .read()
            .expect("object store lock poisoned")
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found(kind.as_str(), key.to_string()))
    }

    async fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Vec<Resource>> {
        let objects = self.objects.read().expect("object store lock poisoned");
        Ok(objects
            .iter()
            .filter(|((k, key), _)| *k == kind && namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    async fn create(&self, mut resource: Resource) -> Result<Resource> {
        let key = (resource.kind(), resource.key());
        if key.1.name.is_empty() {
            return Err(Error::validation_field("name is required", "metadata.name"));
        }

        let created = {
            let mut objects = self.objects.write().expect("object store lock poisoned");
            if objects.contains_key(&key) {
                return Err(Error::conflict(format!("{} {} already exists", key.0, key.1)));
            }

            let version = self.next_version();
            let meta = resource.meta_mut();
            meta.generation = 1;
            meta.resource_version = version;
            meta.deletion_timestamp = None;
            objects.insert(key.clone(), resource.clone());
            resource
        };

        debug!(kind = %key.0, key = %key.1, "Object created");
        self.publish(WatchEventType::Added, &created);
        Ok(created)
    }

    async fn update(&self, mut resource: Resource) -> Result<Resource> {
        let key = (resource.kind(), resource.key());

        let (event_type, updated) = {
            let mut objects = self.objects.write().expect("object store lock poisoned");
            let stored = objects
                .get(&key)
                .ok_or_else(|| Error::not_found(key.0.as_str(), key.1.to_string()))?;
            Self::check_version(stored, &resource)?;

            let generation = if stored.spec_eq(&resource) {
                stored.meta().generation
            } else {
                stored.meta().generation + 1
            };
            let deletion_timestamp = stored.meta().deletion_timestamp;
            resource.copy_status_from(stored);

            let version = self.next_version();
            let meta = resource.meta_mut();
            meta.generation = generation;
            meta.resource_version = version;
            meta.deletion_timestamp = deletion_timestamp;

            if meta.is_deleting() && meta.finalizers.is_empty() {
                objects.remove(&key);
                (WatchEventType::Deleted, resource)
            } else {
                objects.insert(key.clone(), resource.clone());
                (WatchEventType::Updated, resource)
            }
        };

        debug!(kind = %key.0, key = %key.1, event = event_type.as_str(), "Object updated");
        self.publish(event_type, &updated);
        Ok(updated)
    }

    async fn update_status(&self, resource: Resource) -> Result<Resource> {
        let key = (resource.kind(), resource.key());

        let updated = {
            let mut objects = self.objects.write().expect("object store lock poisoned");
            let stored = objects
                .get_mut(&key)
                .ok_or_else(|| Error::not_found(key.0.as_str(), key.1.to_string()))?;
            Self::check_version(stored, &resource)?;

            stored.copy_status_from(&resource);
            stored.meta_mut().resource_version = self.next_version();
            stored.clone()
        };

        self.publish(WatchEventType::Updated, &updated);
        Ok(updated)
    }

    async fn delete(&self, kind: ResourceKind, key: &NamespacedName) -> Result<()> {
        let (event_type, resource) = {
            let mut objects = self.objects.write().expect("object store lock poisoned");
            let object_key = (kind, key.clone());
            let stored = objects
                .get_mut(&object_key)
                .ok_or_else(|| Error::not_found(kind.as_str(), key.to_string()))?;

            if stored.meta().finalizers.is_empty() {
                let removed = objects.remove(&object_key).ok_or_else(|| {
                    Error::internal(format!("{} {} vanished while holding the lock", kind, key))
                })?;
                (WatchEventType::Deleted, removed)
            } else {
                if stored.meta().deletion_timestamp.is_none() {
                    let version = self.next_version();
                    let meta = stored.meta_mut();
                    meta.deletion_timestamp = Some(Utc::now());
                    meta.resource_version = version;
                }
                (WatchEventType::Updated, stored.clone())
            }
        };

        debug!(kind = %kind, key = %key, event = event_type.as_str(), "Object delete requested");
        self.publish(event_type, &resource);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
