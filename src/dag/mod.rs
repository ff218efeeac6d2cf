//! # Routing DAG
//!
//! One fully resolved routing configuration: virtual hosts own routes, routes
//! load-balance across clusters, clusters point at backend Services. A DAG
//! is rebuilt from scratch each cycle by [`DagBuilder`] and never mutated
//! after it is returned.

pub mod builder;
pub mod gateway_processor;
pub mod listener_processor;

pub use builder::{DagBuilder, DagDraft, Processor};
pub use gateway_processor::GatewayApiProcessor;
pub use listener_processor::ListenerProcessor;

use crate::domain::{NamespacedName, ProtocolType, ResourceKind, Secret, Service, ServicePort};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Wildcard virtual host used when a route names no hostnames
pub const WILDCARD_HOST: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathMatchCondition {
    Prefix(String),
    Exact(String),
    Regex(String),
}

impl fmt::Display for PathMatchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(p) => write!(f, "prefix: {}", p),
            Self::Exact(p) => write!(f, "exact: {}", p),
            Self::Regex(p) => write!(f, "regex: {}", p),
        }
    }
}

/// How the data plane talks to an upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpstreamProtocol {
    #[default]
    Http1,
    H2c,
    Tls,
}

impl UpstreamProtocol {
    /// Derived from the Service port's `appProtocol`
    pub fn from_app_protocol(app_protocol: Option<&str>) -> Self {
        match app_protocol {
            Some("h2c") | Some("kubernetes.io/h2c") => Self::H2c,
            Some("tls") | Some("https") | Some("kubernetes.io/tls") => Self::Tls,
            _ => Self::Http1,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Http1 => "",
            Self::H2c => "/h2c",
            Self::Tls => "/tls",
        }
    }
}

/// Identity clusters are de-duplicated by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub service: NamespacedName,
    pub port: u32,
    pub protocol: UpstreamProtocol,
}

/// Resolved backend Service and port
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub upstream: Arc<Service>,
    pub port: ServicePort,
    pub protocol: UpstreamProtocol,
}

impl Cluster {
    pub fn key(&self) -> ClusterKey {
        ClusterKey { service: self.upstream.metadata.key(), port: self.port.port, protocol: self.protocol }
    }

    /// Stable name used for the generated Envoy cluster
    pub fn name(&self) -> String {
        format!(
            "{}/{}/{}{}",
            self.upstream.metadata.namespace,
            self.upstream.metadata.name,
            self.port.port,
            self.protocol.suffix()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCluster {
    pub cluster: Arc<Cluster>,
    pub weight: u32,
}

/// A path match plus the clusters it balances across. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub path: PathMatchCondition,
    clusters: Vec<WeightedCluster>,
}

impl Route {
    /// `None` when `clusters` is empty; such a route must not exist
    pub fn new(path: PathMatchCondition, clusters: Vec<WeightedCluster>) -> Option<Self> {
        if clusters.is_empty() {
            return None;
        }
        Some(Self { path, clusters })
    }

    pub fn clusters(&self) -> &[WeightedCluster] {
        &self.clusters
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualHost {
    pub name: String,
    routes: Vec<Route>,
}

impl VirtualHost {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), routes: Vec::new() }
    }

    /// Attach `route`, replacing any route with the same path condition
    pub fn add_route(&mut self, route: Route) {
        match self.routes.iter_mut().find(|r| r.path == route.path) {
            Some(existing) => *existing = route,
            None => self.routes.push(route),
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// A gateway listener the data plane should open
#[derive(Debug, Clone, PartialEq)]
pub struct DagListener {
    pub name: String,
    pub port: u32,
    pub protocol: ProtocolType,
    pub hostname: Option<String>,
    /// Resolved certificate for HTTPS/TLS listeners
    pub secret: Option<Arc<Secret>>,
}

/// Problem recorded while building; the build continues around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub processor: &'static str,
    pub source: Option<(ResourceKind, NamespacedName)>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some((kind, key)) => write!(f, "[{}] {} {}: {}", self.processor, kind, key, self.message),
            None => write!(f, "[{}] {}", self.processor, self.message),
        }
    }
}

/// Immutable routing graph produced by one build
#[derive(Debug, Clone, Default)]
pub struct Dag {
    pub(crate) virtual_hosts: BTreeMap<String, VirtualHost>,
    pub(crate) listeners: Vec<DagListener>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) cache_revision: u64,
}

impl Dag {
    /// Virtual hosts keyed by host name
    pub fn virtual_hosts(&self) -> impl Iterator<Item = &VirtualHost> {
        self.virtual_hosts.values()
    }

    pub fn virtual_host(&self, host: &str) -> Option<&VirtualHost> {
        self.virtual_hosts.get(host)
    }

    pub fn listeners(&self) -> &[DagListener] {
        &self.listeners
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Resource cache revision the build read from
    pub fn cache_revision(&self) -> u64 {
        self.cache_revision
    }

    /// Distinct clusters referenced by attached routes, by name
    pub fn clusters(&self) -> BTreeMap<String, Arc<Cluster>> {
        let mut clusters = BTreeMap::new();
        for vhost in self.virtual_hosts.values() {
            for route in vhost.routes() {
                for wc in route.clusters() {
                    clusters.entry(wc.cluster.name()).or_insert_with(|| Arc::clone(&wc.cluster));
                }
            }
        }
        clusters
    }

    /// Certificates referenced by listeners, by namespace/name
    pub fn secrets(&self) -> BTreeMap<NamespacedName, Arc<Secret>> {
        self.listeners
            .iter()
            .filter_map(|l| l.secret.as_ref())
            .map(|s| (s.metadata.key(), Arc::clone(s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObjectMeta;

    fn cluster(name: &str, port: u32) -> Arc<Cluster> {
        Arc::new(Cluster {
            upstream: Arc::new(Service { metadata: ObjectMeta::new("default", name), ..Default::default() }),
            port: ServicePort { port, ..Default::default() },
            protocol: UpstreamProtocol::Http1,
        })
    }

    #[test]
    fn route_requires_clusters() {
        assert!(Route::new(PathMatchCondition::Prefix("/".into()), vec![]).is_none());
        assert!(Route::new(
            PathMatchCondition::Prefix("/".into()),
            vec![WeightedCluster { cluster: cluster("echo", 80), weight: 1 }]
        )
        .is_some());
    }

    #[test]
    fn same_path_replaces_route() {
        let mut vhost = VirtualHost::new("*");
        let path = PathMatchCondition::Prefix("/".into());
        vhost.add_route(
            Route::new(path.clone(), vec![WeightedCluster { cluster: cluster("a", 80), weight: 1 }]).unwrap(),
        );
        vhost.add_route(
            Route::new(path, vec![WeightedCluster { cluster: cluster("b", 80), weight: 1 }]).unwrap(),
        );
        assert_eq!(vhost.routes().len(), 1);
        assert_eq!(vhost.routes()[0].clusters()[0].cluster.upstream.metadata.name, "b");
    }

    #[test]
    fn cluster_names_distinguish_protocol() {
        let mut h2 = (*cluster("echo", 80)).clone();
        h2.protocol = UpstreamProtocol::H2c;
        assert_eq!(cluster("echo", 80).name(), "default/echo/80");
        assert_eq!(h2.name(), "default/echo/80/h2c");
    }

    #[test]
    fn app_protocol_mapping() {
        assert_eq!(UpstreamProtocol::from_app_protocol(None), UpstreamProtocol::Http1);
        assert_eq!(UpstreamProtocol::from_app_protocol(Some("h2c")), UpstreamProtocol::H2c);
        assert_eq!(UpstreamProtocol::from_app_protocol(Some("tls")), UpstreamProtocol::Tls);
    }
}
