//! # Reconcilers
//!
//! One work queue and one worker task per resource kind. A worker pops a
//! key, reconciles it against the current cache and store, and maps the
//! outcome onto the retry model: success, a terminal error that is only
//! logged, or a retryable error requeued after its backoff.

pub mod envoy;
pub mod gateway;
pub mod gateway_class;
pub mod http_route;

pub use envoy::EnvoyReconciler;
pub use gateway::GatewayReconciler;
pub use gateway_class::GatewayClassReconciler;
pub use http_route::HttpRouteReconciler;

use crate::cache::ResourceCache;
use crate::domain::{NamespacedName, ResourceKind};
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::reconcile_span;
use crate::status::{StatusAccessor, StatusCache};
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Shared handles every reconciler works with
#[derive(Clone)]
pub struct ControllerContext {
    pub store: Arc<dyn ObjectStore>,
    pub cache: Arc<ResourceCache>,
    pub status: Arc<StatusCache>,
    pub controller_name: String,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext").field("controller_name", &self.controller_name).finish()
    }
}

impl ControllerContext {
    /// Commit staged status, keeping the reconcile error when both fail
    pub async fn finish(&self, accessor: StatusAccessor<'_>, result: Result<()>) -> Result<()> {
        let key = accessor.key().clone();
        match (result, accessor.commit(self.store.as_ref()).await) {
            (Ok(()), Ok(_)) => Ok(()),
            (Ok(()), Err(commit)) => Err(commit),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(commit)) => {
                warn!(key = %key, error = %commit, "Status commit failed after reconcile error");
                Err(e)
            }
        }
    }
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Drive `key` toward its desired state. Must be idempotent.
    async fn reconcile(&self, key: &NamespacedName) -> Result<()>;
}

/// What the worker does after a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Done,
    RequeueAfter(Duration),
    Terminal,
}

impl ReconcileAction {
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(e) => match e.retry_after() {
                Some(after) => Self::RequeueAfter(after),
                None => Self::Terminal,
            },
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Done => "success",
            Self::RequeueAfter(_) => "requeue",
            Self::Terminal => "terminal",
        }
    }
}

/// Deduplicating queue of keys for one kind. A key already waiting is not
/// queued twice; it becomes eligible again once a worker picks it up.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    kind: ResourceKind,
    tx: mpsc::Sender<NamespacedName>,
    pending: Arc<Mutex<HashSet<NamespacedName>>>,
}

impl WorkQueue {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub async fn enqueue(&self, key: NamespacedName) -> Result<()> {
        if !self.pending.lock().expect("work queue lock poisoned").insert(key.clone()) {
            return Ok(());
        }
        self.tx
            .send(key)
            .await
            .map_err(|_| Error::internal(format!("{} worker has stopped", self.kind)))
    }

    fn requeue_after(&self, key: NamespacedName, after: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Err(e) = queue.enqueue(key).await {
                debug!(error = %e, "Dropped requeue");
            }
        });
    }

    fn take(&self, key: &NamespacedName) {
        self.pending.lock().expect("work queue lock poisoned").remove(key);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().expect("work queue lock poisoned").len()
    }
}

/// Start the worker for `reconciler` and return its queue
pub fn spawn_controller(
    reconciler: Arc<dyn Reconciler>,
    queue_depth: usize,
    metrics: MetricsRecorder,
    mut shutdown: watch::Receiver<bool>,
) -> (WorkQueue, JoinHandle<()>) {
    let kind = reconciler.kind();
    let (tx, mut rx) = mpsc::channel(queue_depth.max(1));
    let queue = WorkQueue { kind, tx, pending: Arc::new(Mutex::new(HashSet::new())) };
    let worker_queue = queue.clone();

    let handle = tokio::spawn(async move {
        info!(kind = %kind, "Controller worker started");
        loop {
            let key = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                key = rx.recv() => match key {
                    Some(key) => key,
                    None => break,
                },
            };

            worker_queue.take(&key);
            let span = reconcile_span!(kind, key);
            let started = Instant::now();
            let result = reconciler.reconcile(&key).instrument(span.clone()).await;
            let action = ReconcileAction::from_result(&result);
            metrics.record_reconcile(kind.as_str(), action.outcome(), started.elapsed().as_secs_f64());

            span.in_scope(|| match (action, result) {
                (ReconcileAction::Done, _) => debug!("Reconciled"),
                (ReconcileAction::RequeueAfter(after), Err(e)) => {
                    warn!(error = %e, requeue_after_ms = after.as_millis() as u64, "Reconcile will be retried");
                    worker_queue.requeue_after(key, after);
                }
                (_, Err(e)) => error!(error = %e, "Reconcile failed"),
                (_, Ok(())) => {}
            });
        }
        info!(kind = %kind, "Controller worker stopped");
    });

    (queue, handle)
}
