use crate::config::SnapshotConfig;
use crate::dag::Dag;
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::xds::resources::{
    clusters_from_dag, listeners_from_dag, routes_from_dag, secrets_from_dag, BuiltResource,
    CLUSTER_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL, SECRET_TYPE_URL, SNAPSHOT_TYPE_URLS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Immutable set of Envoy collections published under one version.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub version: u64,
    /// Cache revision of the DAG the snapshot was translated from
    pub cache_revision: u64,
    resources: HashMap<&'static str, Vec<BuiltResource>>,
}

impl Snapshot {
    pub fn resources(&self, type_url: &str) -> &[BuiltResource] {
        self.resources.get(type_url).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    fn sizes(&self) -> Vec<(&'static str, usize)> {
        SNAPSHOT_TYPE_URLS.iter().map(|url| (*url, self.resources(url).len())).collect()
    }
}

/// Consumer of published snapshots.
///
/// Observers run on the publishing task, so they must hand work off rather
/// than block. A failed observer never rolls back the published snapshot.
pub trait SnapshotObserver: Send + Sync {
    fn name(&self) -> &str;

    fn on_snapshot(&self, snapshot: &Arc<Snapshot>) -> Result<()>;
}

/// Forwards snapshots into a bounded channel, failing when the consumer
/// falls behind.
#[derive(Debug)]
pub struct ChannelObserver {
    name: String,
    tx: mpsc::Sender<Arc<Snapshot>>,
}

impl ChannelObserver {
    pub fn new<S: Into<String>>(name: S, capacity: usize) -> (Self, mpsc::Receiver<Arc<Snapshot>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { name: name.into(), tx }, rx)
    }
}

impl SnapshotObserver for ChannelObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_snapshot(&self, snapshot: &Arc<Snapshot>) -> Result<()> {
        self.tx.try_send(snapshot.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::internal(format!(
                "observer {} is behind, dropped snapshot version {}",
                self.name, snapshot.version
            )),
            mpsc::error::TrySendError::Closed(_) => {
                Error::internal(format!("observer {} is closed", self.name))
            }
        })
    }
}

/// Versioned store of translated snapshots.
///
/// All collections share one version counter which advances on every
/// publish, even when the content is unchanged.
pub struct SnapshotCache {
    config: SnapshotConfig,
    version: AtomicU64,
    current: RwLock<Arc<Snapshot>>,
    observers: RwLock<Vec<Arc<dyn SnapshotObserver>>>,
    update_tx: broadcast::Sender<Arc<Snapshot>>,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("version", &self.current_version())
            .field("observers", &self.observers.read().expect("observer lock poisoned").len())
            .finish()
    }
}

impl SnapshotCache {
    pub fn new(config: SnapshotConfig, metrics: MetricsRecorder) -> Self {
        let (update_tx, _) = broadcast::channel(128);
        Self {
            config,
            version: AtomicU64::new(0),
            current: RwLock::new(Arc::new(Snapshot::default())),
            observers: RwLock::new(Vec::new()),
            update_tx,
            metrics,
        }
    }

    /// Observers are notified in registration order
    pub fn register_observer(&self, observer: Arc<dyn SnapshotObserver>) {
        info!(observer = observer.name(), "Registered snapshot observer");
        self.observers.write().expect("observer lock poisoned").push(observer);
    }

    /// Translate a freshly built DAG and publish it as the next version.
    ///
    /// On translation failure nothing is published and the previous
    /// snapshot stays current.
    pub fn on_new_dag(&self, dag: &Dag) -> Result<Arc<Snapshot>> {
        let mut resources = HashMap::new();
        resources.insert(CLUSTER_TYPE_URL, clusters_from_dag(dag, &self.config));
        resources.insert(ROUTE_TYPE_URL, routes_from_dag(dag));
        resources.insert(LISTENER_TYPE_URL, listeners_from_dag(dag, &self.config));
        resources.insert(SECRET_TYPE_URL, secrets_from_dag(dag)?);

        let snapshot = {
            let mut current = self.current.write().expect("snapshot lock poisoned");
            let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
            let snapshot =
                Arc::new(Snapshot { version, cache_revision: dag.cache_revision(), resources });
            *current = snapshot.clone();
            snapshot
        };

        self.metrics.record_snapshot(snapshot.version, &snapshot.sizes());
        debug!(
            version = snapshot.version,
            cache_revision = snapshot.cache_revision,
            clusters = snapshot.resources(CLUSTER_TYPE_URL).len(),
            routes = snapshot.resources(ROUTE_TYPE_URL).len(),
            listeners = snapshot.resources(LISTENER_TYPE_URL).len(),
            secrets = snapshot.resources(SECRET_TYPE_URL).len(),
            "Published snapshot"
        );

        // No subscribers is fine
        let _ = self.update_tx.send(snapshot.clone());
        self.notify_observers(&snapshot);

        Ok(snapshot)
    }

    fn notify_observers(&self, snapshot: &Arc<Snapshot>) {
        let observers = self.observers.read().expect("observer lock poisoned").clone();
        for observer in observers {
            if let Err(e) = observer.on_snapshot(snapshot) {
                warn!(
                    observer = observer.name(),
                    version = snapshot.version,
                    error = %e,
                    "Snapshot observer failed"
                );
                self.metrics.record_observer_failure(observer.name());
            }
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Current version of a single collection along with its contents
    pub fn resources(&self, type_url: &str) -> (u64, Vec<BuiltResource>) {
        let snapshot = self.current();
        (snapshot.version, snapshot.resources(type_url).to_vec())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.update_tx.subscribe()
    }

    /// Stream of future snapshots. Slow readers see `Lagged` items and
    /// should re-read [`SnapshotCache::current`].
    pub fn watch(&self) -> BroadcastStream<Arc<Snapshot>> {
        BroadcastStream::new(self.subscribe())
    }
}
