//! Startup sequence for the Meridian control plane
//!
//! Wires the resource cache, holdoff scheduler, snapshot cache, status
//! cache, reconcilers and event pipeline together over one object store,
//! and returns a handle that owns every background task.

use crate::cache::{GatewaySelection, ResourceCache};
use crate::config::AppConfig;
use crate::controller::{
    spawn_controller, ControllerContext, EnvoyReconciler, GatewayClassReconciler, GatewayReconciler,
    HttpRouteReconciler, Reconciler,
};
use crate::dag::{Dag, DagBuilder};
use crate::domain::NamespacedName;
use crate::errors::Result;
use crate::observability::MetricsRecorder;
use crate::pipeline::{ControllerQueues, Pipeline};
use crate::scheduler::{DagRebuilder, HoldoffScheduler, SchedulerHandle};
use crate::status::StatusCache;
use crate::store::ObjectStore;
use crate::xds::SnapshotCache;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Running control plane
pub struct ControlPlane {
    pub cache: Arc<ResourceCache>,
    pub snapshots: Arc<SnapshotCache>,
    pub status: Arc<StatusCache>,
    pub queues: ControllerQueues,
    scheduler: SchedulerHandle,
    rebuilder: Arc<DagRebuilder>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("snapshot_version", &self.snapshots.current_version())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

fn gateway_selection(config: &AppConfig) -> GatewaySelection {
    let controller = &config.controller;
    let gateway = (!controller.gateway_name.is_empty()).then(|| {
        NamespacedName::new(controller.gateway_namespace.clone(), controller.gateway_name.clone())
    });
    GatewaySelection { gateway, controller_name: controller.controller_name.clone() }
}

impl ControlPlane {
    pub async fn start(
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        metrics: MetricsRecorder,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let cache = Arc::new(ResourceCache::new(gateway_selection(config)));
        let snapshots = Arc::new(SnapshotCache::new(config.snapshot.clone(), metrics.clone()));
        let status = Arc::new(StatusCache::new(metrics.clone()));

        let rebuilder = Arc::new(DagRebuilder::new(
            cache.clone(),
            DagBuilder::default(),
            snapshots.clone(),
            metrics.clone(),
        ));
        let (scheduler, scheduler_task) =
            HoldoffScheduler::spawn(&config.scheduler, rebuilder.clone(), shutdown_rx.clone());
        tasks.push(scheduler_task);

        let ctx = ControllerContext {
            store: store.clone(),
            cache: cache.clone(),
            status: status.clone(),
            controller_name: config.controller.controller_name.clone(),
        };
        let depth = config.controller.queue_depth;
        let mut spawn = |reconciler: Arc<dyn Reconciler>| {
            let (queue, task) = spawn_controller(reconciler, depth, metrics.clone(), shutdown_rx.clone());
            tasks.push(task);
            queue
        };
        let queues = ControllerQueues {
            gateway_class: spawn(Arc::new(GatewayClassReconciler::new(ctx.clone()))),
            gateway: spawn(Arc::new(GatewayReconciler::new(ctx.clone()))),
            http_route: spawn(Arc::new(HttpRouteReconciler::new(ctx.clone()))),
            envoy: spawn(Arc::new(EnvoyReconciler::new(ctx))),
        };

        let pipeline = Pipeline::new(store, cache.clone(), scheduler.clone(), queues.clone(), metrics, depth);
        tasks.push(pipeline.spawn(shutdown_rx).await?);

        info!(
            controller_name = %config.controller.controller_name,
            tasks = tasks.len(),
            "Control plane started"
        );

        Ok(Self { cache, snapshots, status, queues, scheduler, rebuilder, shutdown_tx, tasks })
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// DAG behind the current snapshot
    pub fn latest_dag(&self) -> Option<Arc<Dag>> {
        self.rebuilder.latest_dag()
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(self) {
        info!("Shutting down control plane");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}
