//! DAG construction: processors run in a fixed order against one cache
//! snapshot and fill a shared draft, which is then frozen.

use super::{
    Cluster, ClusterKey, Dag, DagListener, Diagnostic, Route, UpstreamProtocol, VirtualHost,
};
use crate::cache::CacheSnapshot;
use crate::domain::{NamespacedName, ResourceKind};
use crate::errors::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Contributes one family of resources to the draft.
///
/// Processors only read the snapshot. Later processors may rely on what
/// earlier ones put in the draft during the same build.
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, draft: &mut DagDraft, cache: &CacheSnapshot);
}

/// Build-in-progress graph shared by the processors of one cycle
#[derive(Debug, Default)]
pub struct DagDraft {
    virtual_hosts: BTreeMap<String, VirtualHost>,
    clusters: BTreeMap<ClusterKey, Arc<Cluster>>,
    listeners: Vec<DagListener>,
    diagnostics: Vec<Diagnostic>,
}

impl DagDraft {
    /// Get or create the virtual host for `host`
    pub fn ensure_virtual_host(&mut self, host: &str) -> &mut VirtualHost {
        self.virtual_hosts.entry(host.to_string()).or_insert_with(|| VirtualHost::new(host))
    }

    /// Get or create the cluster for a Service port.
    ///
    /// Fails with a retryable reference error when the Service or the port
    /// does not exist in the snapshot.
    pub fn ensure_service(
        &mut self,
        key: &NamespacedName,
        port: u32,
        cache: &CacheSnapshot,
    ) -> Result<Arc<Cluster>> {
        let service = cache
            .lookup_service(key)
            .ok_or_else(|| Error::reference("Service", key.to_string(), "service does not exist"))?;
        let service_port = service.port(port).ok_or_else(|| {
            Error::reference("Service", key.to_string(), format!("service has no port {}", port))
        })?;

        let protocol = UpstreamProtocol::from_app_protocol(service_port.app_protocol.as_deref());
        let cluster_key = ClusterKey { service: key.clone(), port, protocol };
        let cluster = self
            .clusters
            .entry(cluster_key)
            .or_insert_with(|| {
                Arc::new(Cluster { upstream: Arc::clone(service), port: service_port.clone(), protocol })
            })
            .clone();
        Ok(cluster)
    }

    /// Attach `route` to the virtual host for every entry of `hosts`
    pub fn attach_route(&mut self, hosts: &[String], route: &Route) {
        for host in hosts {
            self.ensure_virtual_host(host).add_route(route.clone());
        }
    }

    pub fn add_listener(&mut self, listener: DagListener) {
        self.listeners.push(listener);
    }

    pub fn listeners(&self) -> &[DagListener] {
        &self.listeners
    }

    /// Record a problem with `source` and keep building
    pub fn error<S: Into<String>>(
        &mut self,
        processor: &'static str,
        source: Option<(ResourceKind, NamespacedName)>,
        message: S,
    ) {
        let diagnostic = Diagnostic { processor, source, message: message.into() };
        warn!(diagnostic = %diagnostic, "DAG build diagnostic");
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn finish(mut self, cache_revision: u64) -> Dag {
        self.virtual_hosts.retain(|_, vhost| !vhost.routes().is_empty());
        Dag {
            virtual_hosts: self.virtual_hosts,
            listeners: self.listeners,
            diagnostics: self.diagnostics,
            cache_revision,
        }
    }
}

/// Runs processors in order and freezes the result
pub struct DagBuilder {
    processors: Vec<Box<dyn Processor>>,
}

impl std::fmt::Debug for DagBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagBuilder")
            .field("processors", &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new(vec![Box::new(super::ListenerProcessor), Box::new(super::GatewayApiProcessor)])
    }
}

impl DagBuilder {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    pub fn build(&self, cache: &CacheSnapshot) -> Dag {
        let mut draft = DagDraft::default();
        for processor in &self.processors {
            processor.run(&mut draft, cache);
        }

        let dag = draft.finish(cache.revision());
        debug!(
            cache_revision = dag.cache_revision(),
            virtual_hosts = dag.virtual_hosts.len(),
            listeners = dag.listeners.len(),
            diagnostics = dag.diagnostics.len(),
            "DAG built"
        );
        dag
    }
}
