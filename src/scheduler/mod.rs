//! # Holdoff Scheduler
//!
//! Coalesces bursts of change notifications into single DAG rebuilds.
//!
//! The scheduler is a small state machine driven by one task:
//!
//! - `Idle` waits for the first notification.
//! - `Holding` absorbs further notifications. Each one pushes the short
//!   holdoff deadline out, but never past the maximum holdoff measured
//!   from the first notification of the burst.
//! - `Draining` runs exactly one rebuild covering the whole burst.
//!   Notifications arriving meanwhile stay queued and open the next burst.
//!
//! Rebuilds run inline on the scheduler task, so two rebuilds never overlap.

use crate::cache::ResourceCache;
use crate::config::SchedulerConfig;
use crate::dag::{Dag, DagBuilder};
use crate::domain::ResourceKind;
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::rebuild_span;
use crate::store::WatchEventType;
use crate::xds::SnapshotCache;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Holding,
    Draining,
}

/// A change applied to the resource cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: ResourceKind,
    pub event: WatchEventType,
}

/// Work performed once per settled burst
pub trait Rebuild: Send + Sync {
    /// `pending` is the number of notifications folded into this rebuild
    fn rebuild(&self, pending: u64) -> Result<()>;
}

/// Rebuilds the DAG from a cache snapshot and publishes it
pub struct DagRebuilder {
    cache: Arc<ResourceCache>,
    builder: DagBuilder,
    snapshots: Arc<SnapshotCache>,
    metrics: MetricsRecorder,
    latest: RwLock<Option<Arc<Dag>>>,
}

impl DagRebuilder {
    pub fn new(
        cache: Arc<ResourceCache>,
        builder: DagBuilder,
        snapshots: Arc<SnapshotCache>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { cache, builder, snapshots, metrics, latest: RwLock::new(None) }
    }

    /// DAG of the most recent successful rebuild
    pub fn latest_dag(&self) -> Option<Arc<Dag>> {
        self.latest.read().expect("dag lock poisoned").clone()
    }
}

impl Rebuild for DagRebuilder {
    fn rebuild(&self, pending: u64) -> Result<()> {
        let span = rebuild_span!(pending);
        let _enter = span.enter();
        let started = std::time::Instant::now();

        let cache = self.cache.snapshot();
        let dag = Arc::new(self.builder.build(&cache));
        let snapshot = self.snapshots.on_new_dag(&dag)?;
        *self.latest.write().expect("dag lock poisoned") = Some(dag.clone());

        let elapsed = started.elapsed();
        self.metrics.record_rebuild(pending, elapsed.as_secs_f64());
        info!(
            version = snapshot.version,
            cache_revision = cache.revision(),
            virtual_hosts = dag.virtual_hosts().count(),
            diagnostics = dag.diagnostics().len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "DAG rebuilt"
        );
        Ok(())
    }
}

/// Sending side of the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ChangeNotification>,
    state: watch::Receiver<SchedulerState>,
}

impl SchedulerHandle {
    pub fn notify(&self, notification: ChangeNotification) -> Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| Error::internal("holdoff scheduler has stopped"))
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }
}

pub struct HoldoffScheduler {
    delay: Duration,
    max_delay: Duration,
    rx: mpsc::UnboundedReceiver<ChangeNotification>,
    state: watch::Sender<SchedulerState>,
    rebuilder: Arc<dyn Rebuild>,
}

impl HoldoffScheduler {
    /// Start the scheduler task. It exits when `shutdown` flips to true or
    /// every handle has been dropped.
    pub fn spawn(
        config: &SchedulerConfig,
        rebuilder: Arc<dyn Rebuild>,
        shutdown: watch::Receiver<bool>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SchedulerState::Idle);
        let scheduler = Self {
            delay: config.holdoff_delay(),
            max_delay: config.holdoff_max_delay(),
            rx,
            state,
            rebuilder,
        };

        info!(
            holdoff_delay_ms = config.holdoff_delay_ms,
            holdoff_max_delay_ms = config.holdoff_max_delay_ms,
            "Starting holdoff scheduler"
        );
        let task = tokio::spawn(scheduler.run(shutdown));
        (SchedulerHandle { tx, state: state_rx }, task)
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.state.send_replace(SchedulerState::Idle);

            let first = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                notification = self.rx.recv() => match notification {
                    Some(n) => n,
                    None => break,
                },
            };

            self.state.send_replace(SchedulerState::Holding);
            let (pending, closed) = match self.hold(first, &mut shutdown).await {
                Some(result) => result,
                None => break,
            };

            self.state.send_replace(SchedulerState::Draining);
            if let Err(e) = self.rebuilder.rebuild(pending) {
                error!(error = %e, pending, "Rebuild failed, previous snapshot stays current");
            }

            if closed {
                break;
            }
        }
        info!("Holdoff scheduler stopped");
    }

    /// Absorb the burst opened by `first`. Returns the number of folded
    /// notifications and whether the channel closed, or `None` on shutdown.
    async fn hold(
        &mut self,
        first: ChangeNotification,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<(u64, bool)> {
        let started = Instant::now();
        let cap = started + self.max_delay;
        let mut deadline = (started + self.delay).min(cap);
        let mut pending = 1u64;
        debug!(kind = %first.kind, event = first.event.as_str(), "Holdoff window opened");

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return Some((pending, false)),
                _ = wait_for_shutdown(shutdown) => return None,
                notification = self.rx.recv() => match notification {
                    Some(n) => {
                        pending += 1;
                        deadline = (Instant::now() + self.delay).min(cap);
                        debug!(kind = %n.kind, event = n.event.as_str(), pending, "Notification coalesced");
                    }
                    None => return Some((pending, true)),
                },
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
