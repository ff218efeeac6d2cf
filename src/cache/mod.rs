//! # Resource Cache
//!
//! In-memory mirror of every watched kind. Writers apply whole-object
//! replace or delete operations; readers never see the live maps and
//! instead take an immutable [`CacheSnapshot`] at the start of a build or
//! validation pass.

use crate::domain::{
    Envoy, Gateway, GatewayClass, HttpRoute, NamespacedName, Resource, ResourceKind, Secret, Service,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::trace;

#[derive(Debug, Clone, Default)]
struct CacheState {
    gateway_classes: BTreeMap<NamespacedName, Arc<GatewayClass>>,
    gateways: BTreeMap<NamespacedName, Arc<Gateway>>,
    http_routes: BTreeMap<NamespacedName, Arc<HttpRoute>>,
    services: BTreeMap<NamespacedName, Arc<Service>>,
    secrets: BTreeMap<NamespacedName, Arc<Secret>>,
    envoys: BTreeMap<NamespacedName, Arc<Envoy>>,
}

/// Where the cache finds "the one gateway" whose routes are programmed
#[derive(Debug, Clone, Default)]
pub struct GatewaySelection {
    /// Explicit gateway; `None` picks the first gateway of an owned class
    pub gateway: Option<NamespacedName>,
    pub controller_name: String,
}

#[derive(Debug)]
pub struct ResourceCache {
    selection: GatewaySelection,
    state: RwLock<CacheState>,
    revision: AtomicU64,
}

impl ResourceCache {
    pub fn new(selection: GatewaySelection) -> Self {
        Self { selection, state: RwLock::new(CacheState::default()), revision: AtomicU64::new(0) }
    }

    /// Monotonic counter bumped by every write
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Replace the cached copy of `resource`
    pub fn insert(&self, resource: &Resource) {
        let key = resource.key();
        {
            let mut state = self.state.write().expect("resource cache lock poisoned");
            match resource {
                Resource::GatewayClass(r) => {
                    state.gateway_classes.insert(key.clone(), Arc::new(r.clone()));
                }
                Resource::Gateway(r) => {
                    state.gateways.insert(key.clone(), Arc::new(r.clone()));
                }
                Resource::HttpRoute(r) => {
                    state.http_routes.insert(key.clone(), Arc::new(r.clone()));
                }
                Resource::Service(r) => {
                    state.services.insert(key.clone(), Arc::new(r.clone()));
                }
                Resource::Secret(r) => {
                    state.secrets.insert(key.clone(), Arc::new(r.clone()));
                }
                Resource::Envoy(r) => {
                    state.envoys.insert(key.clone(), Arc::new(r.clone()));
                }
            }
        }
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(kind = %resource.kind(), key = %key, revision, "Cache insert");
    }

    /// Drop the cached copy; returns whether anything was removed
    pub fn remove(&self, kind: ResourceKind, key: &NamespacedName) -> bool {
        let removed = {
            let mut state = self.state.write().expect("resource cache lock poisoned");
            match kind {
                ResourceKind::GatewayClass => state.gateway_classes.remove(key).is_some(),
                ResourceKind::Gateway => state.gateways.remove(key).is_some(),
                ResourceKind::HttpRoute => state.http_routes.remove(key).is_some(),
                ResourceKind::Service => state.services.remove(key).is_some(),
                ResourceKind::Secret => state.secrets.remove(key).is_some(),
                ResourceKind::Envoy => state.envoys.remove(key).is_some(),
            }
        };
        if removed {
            let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
            trace!(kind = %kind, key = %key, revision, "Cache remove");
        }
        removed
    }

    /// Cached copy of one object
    pub fn get(&self, kind: ResourceKind, key: &NamespacedName) -> Option<Resource> {
        let state = self.state.read().expect("resource cache lock poisoned");
        match kind {
            ResourceKind::GatewayClass => {
                state.gateway_classes.get(key).map(|r| Resource::GatewayClass(r.as_ref().clone()))
            }
            ResourceKind::Gateway => state.gateways.get(key).map(|r| Resource::Gateway(r.as_ref().clone())),
            ResourceKind::HttpRoute => {
                state.http_routes.get(key).map(|r| Resource::HttpRoute(r.as_ref().clone()))
            }
            ResourceKind::Service => state.services.get(key).map(|r| Resource::Service(r.as_ref().clone())),
            ResourceKind::Secret => state.secrets.get(key).map(|r| Resource::Secret(r.as_ref().clone())),
            ResourceKind::Envoy => state.envoys.get(key).map(|r| Resource::Envoy(r.as_ref().clone())),
        }
    }

    /// Keys currently cached for `kind`
    pub fn keys(&self, kind: ResourceKind) -> Vec<NamespacedName> {
        let state = self.state.read().expect("resource cache lock poisoned");
        match kind {
            ResourceKind::GatewayClass => state.gateway_classes.keys().cloned().collect(),
            ResourceKind::Gateway => state.gateways.keys().cloned().collect(),
            ResourceKind::HttpRoute => state.http_routes.keys().cloned().collect(),
            ResourceKind::Service => state.services.keys().cloned().collect(),
            ResourceKind::Secret => state.secrets.keys().cloned().collect(),
            ResourceKind::Envoy => state.envoys.keys().cloned().collect(),
        }
    }

    /// Point-in-time read view. Later writes do not affect it.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        let state = self.state.read().expect("resource cache lock poisoned");
        Arc::new(CacheSnapshot {
            revision: self.revision(),
            selection: self.selection.clone(),
            state: state.clone(),
        })
    }
}

/// Immutable view of the cache used by one build or validation pass
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    revision: u64,
    selection: GatewaySelection,
    state: CacheState,
}

impl CacheSnapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn controller_name(&self) -> &str {
        &self.selection.controller_name
    }

    /// The gateway whose routes are programmed, if present
    pub fn gateway(&self) -> Option<&Arc<Gateway>> {
        match &self.selection.gateway {
            Some(key) => self.state.gateways.get(key),
            None => self.state.gateways.values().find(|gw| {
                self.gateway_class(&gw.spec.gateway_class_name)
                    .is_some_and(|gc| gc.spec.controller == self.selection.controller_name)
            }),
        }
    }

    pub fn gateways(&self) -> impl Iterator<Item = &Arc<Gateway>> {
        self.state.gateways.values()
    }

    pub fn get_gateway(&self, key: &NamespacedName) -> Option<&Arc<Gateway>> {
        self.state.gateways.get(key)
    }

    pub fn gateway_class(&self, name: &str) -> Option<&Arc<GatewayClass>> {
        self.state.gateway_classes.get(&NamespacedName::cluster_scoped(name))
    }

    /// Routes in namespace/name order
    pub fn http_routes(&self) -> impl Iterator<Item = &Arc<HttpRoute>> {
        self.state.http_routes.values()
    }

    pub fn get_http_route(&self, key: &NamespacedName) -> Option<&Arc<HttpRoute>> {
        self.state.http_routes.get(key)
    }

    pub fn lookup_service(&self, key: &NamespacedName) -> Option<&Arc<Service>> {
        self.state.services.get(key)
    }

    pub fn lookup_secret(&self, key: &NamespacedName) -> Option<&Arc<Secret>> {
        self.state.secrets.get(key)
    }

    pub fn get_envoy(&self, key: &NamespacedName) -> Option<&Arc<Envoy>> {
        self.state.envoys.get(key)
    }

    pub fn envoys_in_namespace<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a Arc<Envoy>> + 'a {
        self.state.envoys.values().filter(move |e| e.metadata.namespace == namespace)
    }
}
