//! # Event Pipeline
//!
//! Moves store watch events through three stages:
//!
//! 1. decode: turn a watch event into a [`Change`], noting whether only
//!    status moved.
//! 2. admit: apply the change to the resource cache and decide whether it
//!    matters to the DAG or to a reconciler.
//! 3. enqueue: notify the holdoff scheduler and push affected keys onto
//!    the per-kind work queues.
//!
//! Status-only updates refresh the cache but trigger neither a rebuild nor
//! a reconcile of the object itself, so status writes never loop.

use crate::cache::ResourceCache;
use crate::controller::WorkQueue;
use crate::domain::{
    NamespacedName, Resource, ResourceKind, OWNING_ENVOY_NAME_LABEL, OWNING_ENVOY_NS_LABEL,
};
use crate::errors::Result;
use crate::observability::MetricsRecorder;
use crate::scheduler::{ChangeNotification, SchedulerHandle};
use crate::store::{ObjectStore, WatchEvent, WatchEventType};
use crate::validation::gateway::certificate_key;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A decoded watch event
#[derive(Debug, Clone)]
pub struct Change {
    pub event_type: WatchEventType,
    pub resource: Arc<Resource>,
    pub status_only: bool,
}

impl Change {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn key(&self) -> NamespacedName {
        self.resource.key()
    }
}

enum Stage {
    Event(WatchEvent),
    Resync,
}

/// Work queues of the running reconcilers
#[derive(Debug, Clone)]
pub struct ControllerQueues {
    pub gateway_class: WorkQueue,
    pub gateway: WorkQueue,
    pub http_route: WorkQueue,
    pub envoy: WorkQueue,
}

impl ControllerQueues {
    pub fn for_kind(&self, kind: ResourceKind) -> Option<&WorkQueue> {
        match kind {
            ResourceKind::GatewayClass => Some(&self.gateway_class),
            ResourceKind::Gateway => Some(&self.gateway),
            ResourceKind::HttpRoute => Some(&self.http_route),
            ResourceKind::Envoy => Some(&self.envoy),
            ResourceKind::Service | ResourceKind::Secret => None,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    cache: Arc<ResourceCache>,
    scheduler: SchedulerHandle,
    queues: ControllerQueues,
    metrics: MetricsRecorder,
    queue_depth: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<ResourceCache>,
        scheduler: SchedulerHandle,
        queues: ControllerQueues,
        metrics: MetricsRecorder,
        queue_depth: usize,
    ) -> Self {
        Self { store, cache, scheduler, queues, metrics, queue_depth }
    }

    /// Subscribe to the store, run the initial list, then follow events
    /// until shutdown.
    pub async fn spawn(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        // Subscribe first so nothing between the list and the watch is missed.
        let mut events = self.store.watch();
        self.resync().await?;

        let (tx, mut rx) = mpsc::channel(self.queue_depth.max(1));
        let mut decode_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let stage = tokio::select! {
                    _ = decode_shutdown.changed() => break,
                    received = events.recv() => match received {
                        Ok(event) => Stage::Event(event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Watch lagged, scheduling full resync");
                            Stage::Resync
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                if tx.send(stage).await.is_err() {
                    break;
                }
            }
            debug!("Watch decode stage stopped");
        });

        let mut shutdown = shutdown;
        Ok(tokio::spawn(async move {
            info!("Event pipeline started");
            loop {
                let stage = tokio::select! {
                    _ = shutdown.changed() => break,
                    stage = rx.recv() => match stage {
                        Some(stage) => stage,
                        None => break,
                    },
                };

                let result = match stage {
                    Stage::Event(event) => self.process(event).await,
                    Stage::Resync => self.resync().await,
                };
                if let Err(e) = result {
                    warn!(error = %e, "Event pipeline stage failed");
                }
            }
            info!("Event pipeline stopped");
        }))
    }

    async fn process(&self, event: WatchEvent) -> Result<()> {
        let change = self.decode(event);
        self.metrics.record_notification(change.kind().as_str(), change.event_type.as_str());
        if let Some(change) = self.admit(change) {
            self.enqueue(&change).await?;
        }
        Ok(())
    }

    fn decode(&self, event: WatchEvent) -> Change {
        let status_only = event.event_type == WatchEventType::Updated
            && self
                .cache
                .get(event.resource.kind(), &event.resource.key())
                .is_some_and(|cached| same_desired_state(&cached, &event.resource));

        Change { event_type: event.event_type, resource: event.resource, status_only }
    }

    /// Apply to the cache; `None` when nothing downstream needs to run
    fn admit(&self, change: Change) -> Option<Change> {
        match change.event_type {
            WatchEventType::Deleted => {
                self.cache.remove(change.kind(), &change.key());
            }
            WatchEventType::Added | WatchEventType::Updated => self.cache.insert(&change.resource),
        }

        if change.status_only && change.kind() != ResourceKind::GatewayClass {
            debug!(kind = %change.kind(), key = %change.key(), "Status-only update");
            return None;
        }
        Some(change)
    }

    async fn enqueue(&self, change: &Change) -> Result<()> {
        let kind = change.kind();
        let key = change.key();

        if !change.status_only {
            if kind != ResourceKind::Envoy {
                self.scheduler.notify(ChangeNotification { kind, event: change.event_type })?;
            }
            if let Some(queue) = self.queues.for_kind(kind) {
                queue.enqueue(key.clone()).await?;
            }
        }

        for (dependent_kind, dependent) in self.dependents(change) {
            if let Some(queue) = self.queues.for_kind(dependent_kind) {
                queue.enqueue(dependent).await?;
            }
        }
        Ok(())
    }

    /// Objects whose verdict depends on the changed resource
    fn dependents(&self, change: &Change) -> Vec<(ResourceKind, NamespacedName)> {
        let cache = self.cache.snapshot();
        let all_routes = || {
            cache.http_routes().map(|route| (ResourceKind::HttpRoute, route.metadata.key())).collect::<Vec<_>>()
        };
        match change.resource.as_ref() {
            Resource::GatewayClass(class) => {
                let mut dependents: Vec<_> = cache
                    .gateways()
                    .filter(|gw| gw.spec.gateway_class_name == class.metadata.name)
                    .map(|gw| (ResourceKind::Gateway, gw.metadata.key()))
                    .collect();
                // class ownership decides which gateway binds routes
                if !change.status_only {
                    dependents.extend(all_routes());
                }
                dependents
            }
            Resource::Gateway(_) => all_routes(),
            Resource::Secret(secret) => {
                let key = secret.metadata.key();
                cache
                    .gateways()
                    .filter(|gw| {
                        gw.spec
                            .listeners
                            .iter()
                            .filter_map(|l| l.tls.as_ref().and_then(|tls| tls.certificate_ref.as_ref()))
                            .any(|reference| certificate_key(gw, reference) == key)
                    })
                    .map(|gw| (ResourceKind::Gateway, gw.metadata.key()))
                    .collect()
            }
            Resource::Service(service) => {
                let mut dependents: Vec<_> = cache
                    .http_routes()
                    .filter(|route| {
                        route.metadata.namespace == service.metadata.namespace
                            && route.spec.rules.iter().flat_map(|r| &r.forward_to).any(|f| {
                                f.service_name.as_deref() == Some(service.metadata.name.as_str())
                            })
                    })
                    .map(|route| (ResourceKind::HttpRoute, route.metadata.key()))
                    .collect();

                let labels = &service.metadata.labels;
                if let (Some(ns), Some(name)) =
                    (labels.get(OWNING_ENVOY_NS_LABEL), labels.get(OWNING_ENVOY_NAME_LABEL))
                {
                    dependents.push((ResourceKind::Envoy, NamespacedName::new(ns.clone(), name.clone())));
                }
                dependents
            }
            _ => Vec::new(),
        }
    }

    /// Bring the cache in line with a full list of the store and requeue
    /// everything. Every kind is cached before any key is queued, so
    /// reconcilers see the whole listing.
    pub async fn resync(&self) -> Result<()> {
        let mut listed = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            let resources = self.store.list(kind, None).await?;
            let live: HashSet<NamespacedName> = resources.iter().map(Resource::key).collect();

            for stale in self.cache.keys(kind).into_iter().filter(|key| !live.contains(key)) {
                self.cache.remove(kind, &stale);
            }
            for resource in &resources {
                self.cache.insert(resource);
            }
            self.metrics.record_notification(kind.as_str(), "resync");
            listed.push((kind, live));
        }

        let mut objects = 0usize;
        for (kind, live) in listed {
            objects += live.len();
            self.scheduler.notify(ChangeNotification { kind, event: WatchEventType::Updated })?;
            if let Some(queue) = self.queues.for_kind(kind) {
                for key in live {
                    queue.enqueue(key).await?;
                }
            }
        }

        info!(objects, "Resynced resource cache");
        Ok(())
    }
}

/// Same spec, labels, annotations, finalizers and deletion state
fn same_desired_state(cached: &Resource, incoming: &Resource) -> bool {
    cached.spec_eq(incoming)
        && cached.meta().finalizers == incoming.meta().finalizers
        && cached.meta().deletion_timestamp == incoming.meta().deletion_timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, ConditionStatus, Gateway, ObjectMeta, CONDITION_READY};

    #[test]
    fn status_changes_are_not_desired_state_changes() {
        let gateway: Resource =
            Gateway { metadata: ObjectMeta::new("projectcontour", "contour"), ..Default::default() }.into();

        let mut with_status = gateway.clone();
        with_status
            .conditions_mut()
            .unwrap()
            .push(Condition::new(CONDITION_READY, ConditionStatus::True, "Valid", ""));
        assert!(same_desired_state(&gateway, &with_status));

        let mut deleting = gateway.clone();
        deleting.meta_mut().deletion_timestamp = Some(chrono::Utc::now());
        assert!(!same_desired_state(&gateway, &deleting));
    }
}
