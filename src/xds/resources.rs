//! DAG to Envoy resource translation using envoy-types.

use crate::config::SnapshotConfig;
use crate::dag::{Cluster as DagCluster, Dag, DagListener, PathMatchCondition, UpstreamProtocol, VirtualHost as DagVirtualHost};
use crate::domain::{ProtocolType, Secret as DomainSecret};
use crate::errors::{Error, Result};
use envoy_types::pb::envoy::config::cluster::v3::cluster::{ClusterDiscoveryType, DiscoveryType};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, config_source::ConfigSourceSpecifier, data_source::Specifier,
    socket_address, transport_socket::ConfigType as TransportSocketConfigType, Address,
    AggregatedConfigSource, ConfigSource, DataSource, Http2ProtocolOptions, SocketAddress,
    TransportSocket,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, listener_filter::ConfigType as ListenerFilterConfigType,
    Filter, FilterChain, FilterChainMatch, Listener, ListenerFilter,
};
use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, route_match::PathSpecifier,
    weighted_cluster::ClusterWeight, Route, RouteAction, RouteConfiguration, RouteMatch,
    VirtualHost, WeightedCluster,
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    secret, CommonTlsContext, DownstreamTlsContext, SdsSecretConfig, Secret, TlsCertificate,
    UpstreamTlsContext,
};
use envoy_types::pb::envoy::extensions::upstreams::http::v3::http_protocol_options::explicit_http_config::ProtocolConfig;
use envoy_types::pb::envoy::extensions::upstreams::http::v3::{
    http_protocol_options::{ExplicitHttpConfig, UpstreamProtocolOptions},
    HttpProtocolOptions,
};
use envoy_types::pb::google::protobuf::{Any, Duration, UInt32Value};
use prost::Message;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const SECRET_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";
const HTTP_PROTOCOL_OPTIONS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.upstreams.http.v3.HttpProtocolOptions";
const HCM_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

/// Collection types carried by every snapshot, in publish order
pub const SNAPSHOT_TYPE_URLS: [&str; 4] = [CLUSTER_TYPE_URL, ROUTE_TYPE_URL, LISTENER_TYPE_URL, SECRET_TYPE_URL];

pub const HTTP_LISTENER_NAME: &str = "ingress_http";
pub const HTTPS_LISTENER_NAME: &str = "ingress_https";

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

fn any_from_message<M: Message>(type_url: &str, message: &M) -> Any {
    Any { type_url: type_url.to_string(), value: message.encode_to_vec() }
}

fn built<M: Message>(name: String, type_url: &str, message: &M) -> BuiltResource {
    BuiltResource { name, resource: any_from_message(type_url, message) }
}

fn ads_config_source() -> ConfigSource {
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
        ..Default::default()
    }
}

fn duration(value: std::time::Duration) -> Duration {
    Duration { seconds: value.as_secs() as i64, nanos: value.subsec_nanos() as i32 }
}

fn socket_address(host: &str, port: u32) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            address: host.to_string(),
            port_specifier: Some(socket_address::PortSpecifier::PortValue(port)),
            protocol: socket_address::Protocol::Tcp as i32,
            ..Default::default()
        })),
    }
}

/// SDS name of a certificate
pub fn secret_name(secret: &DomainSecret) -> String {
    format!("{}/{}", secret.metadata.namespace, secret.metadata.name)
}

/// Build cluster resources for every cluster referenced by the DAG
pub fn clusters_from_dag(dag: &Dag, config: &SnapshotConfig) -> Vec<BuiltResource> {
    dag.clusters().values().map(|cluster| build_cluster(cluster, config)).collect()
}

fn build_cluster(dag_cluster: &DagCluster, config: &SnapshotConfig) -> BuiltResource {
    let name = dag_cluster.name();
    let service = &dag_cluster.upstream.metadata;
    let host = format!("{}.{}.svc.{}", service.name, service.namespace, config.cluster_domain);

    let mut cluster = Cluster {
        name: name.clone(),
        connect_timeout: Some(duration(config.connect_timeout())),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::StrictDns as i32)),
        load_assignment: Some(ClusterLoadAssignment {
            cluster_name: name.clone(),
            endpoints: vec![LocalityLbEndpoints {
                lb_endpoints: vec![LbEndpoint {
                    host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(Endpoint {
                        address: Some(socket_address(&host, dag_cluster.port.port)),
                        ..Default::default()
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    };

    match dag_cluster.protocol {
        UpstreamProtocol::Http1 => {}
        UpstreamProtocol::H2c => {
            cluster.typed_extension_protocol_options = http2_protocol_options();
        }
        UpstreamProtocol::Tls => {
            let tls_context = UpstreamTlsContext {
                common_tls_context: Some(CommonTlsContext::default()),
                sni: host,
                ..Default::default()
            };
            cluster.transport_socket = Some(TransportSocket {
                name: "envoy.transport_sockets.tls".to_string(),
                config_type: Some(TransportSocketConfigType::TypedConfig(any_from_message(
                    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext",
                    &tls_context,
                ))),
            });
        }
    }

    built(name, CLUSTER_TYPE_URL, &cluster)
}

fn http2_protocol_options() -> HashMap<String, Any> {
    let options = HttpProtocolOptions {
        upstream_protocol_options: Some(UpstreamProtocolOptions::ExplicitHttpConfig(ExplicitHttpConfig {
            protocol_config: Some(ProtocolConfig::Http2ProtocolOptions(Http2ProtocolOptions::default())),
        })),
        ..Default::default()
    };

    let mut map = HashMap::new();
    map.insert(
        "envoy.extensions.upstreams.http.v3.HttpProtocolOptions".to_string(),
        any_from_message(HTTP_PROTOCOL_OPTIONS_TYPE_URL, &options),
    );
    map
}

/// Build one route configuration per listener family present in the DAG
pub fn routes_from_dag(dag: &Dag) -> Vec<BuiltResource> {
    let virtual_hosts: Vec<VirtualHost> = dag.virtual_hosts().map(build_virtual_host).collect();

    route_config_names(dag)
        .into_iter()
        .map(|name| {
            let config = RouteConfiguration {
                name: name.to_string(),
                virtual_hosts: virtual_hosts.clone(),
                ..Default::default()
            };
            built(name.to_string(), ROUTE_TYPE_URL, &config)
        })
        .collect()
}

fn route_config_names(dag: &Dag) -> Vec<&'static str> {
    let mut names = Vec::new();
    if dag.listeners().iter().any(|l| l.protocol == ProtocolType::Http) {
        names.push(HTTP_LISTENER_NAME);
    }
    if dag.listeners().iter().any(|l| l.secret.is_some()) {
        names.push(HTTPS_LISTENER_NAME);
    }
    names
}

fn build_virtual_host(vhost: &DagVirtualHost) -> VirtualHost {
    let mut routes: Vec<_> = vhost.routes().iter().collect();
    // Envoy picks the first match, so more specific paths go first.
    routes.sort_by(|a, b| path_specificity(&b.path).cmp(&path_specificity(&a.path)));

    VirtualHost {
        name: vhost.name.clone(),
        domains: vec![vhost.name.clone()],
        routes: routes.into_iter().map(build_route).collect(),
        ..Default::default()
    }
}

fn path_specificity(path: &PathMatchCondition) -> (u8, usize) {
    match path {
        PathMatchCondition::Exact(p) => (2, p.len()),
        PathMatchCondition::Regex(p) => (1, p.len()),
        PathMatchCondition::Prefix(p) => (0, p.len()),
    }
}

fn build_route(route: &crate::dag::Route) -> Route {
    let path_specifier = match &route.path {
        PathMatchCondition::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
        PathMatchCondition::Exact(path) => PathSpecifier::Path(path.clone()),
        PathMatchCondition::Regex(regex) => {
            PathSpecifier::SafeRegex(envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher {
                regex: regex.clone(),
                ..Default::default()
            })
        }
    };

    let cluster_specifier = match route.clusters() {
        [single] => ClusterSpecifier::Cluster(single.cluster.name()),
        many => {
            let all_zero = many.iter().all(|wc| wc.weight == 0);
            ClusterSpecifier::WeightedClusters(WeightedCluster {
                clusters: many
                    .iter()
                    .map(|wc| ClusterWeight {
                        name: wc.cluster.name(),
                        weight: Some(UInt32Value { value: if all_zero { 1 } else { wc.weight } }),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
        }
    };

    #[allow(deprecated)]
    let action = RouteAction { cluster_specifier: Some(cluster_specifier), ..Default::default() };

    Route {
        r#match: Some(RouteMatch { path_specifier: Some(path_specifier), ..Default::default() }),
        action: Some(Action::Route(action)),
        ..Default::default()
    }
}

/// Build the plaintext and TLS listeners requested by the DAG
pub fn listeners_from_dag(dag: &Dag, config: &SnapshotConfig) -> Vec<BuiltResource> {
    let mut listeners = Vec::new();

    if dag.listeners().iter().any(|l| l.protocol == ProtocolType::Http) {
        let listener = Listener {
            name: HTTP_LISTENER_NAME.to_string(),
            address: Some(socket_address("0.0.0.0", config.http_listener_port)),
            filter_chains: vec![FilterChain {
                filters: vec![http_connection_manager(HTTP_LISTENER_NAME)],
                ..Default::default()
            }],
            ..Default::default()
        };
        listeners.push(built(HTTP_LISTENER_NAME.to_string(), LISTENER_TYPE_URL, &listener));
    }

    let filter_chains = secure_filter_chains(dag.listeners());
    if !filter_chains.is_empty() {
        let listener = Listener {
            name: HTTPS_LISTENER_NAME.to_string(),
            address: Some(socket_address("0.0.0.0", config.https_listener_port)),
            listener_filters: vec![ListenerFilter {
                name: "envoy.filters.listener.tls_inspector".to_string(),
                config_type: Some(ListenerFilterConfigType::TypedConfig(any_from_message(
                    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector",
                    &TlsInspector::default(),
                ))),
                ..Default::default()
            }],
            filter_chains,
            ..Default::default()
        };
        listeners.push(built(HTTPS_LISTENER_NAME.to_string(), LISTENER_TYPE_URL, &listener));
    }

    listeners
}

/// One TLS chain per distinct hostname. Envoy rejects chains with identical
/// matches, so the first listener for a hostname (or for no hostname) wins.
fn secure_filter_chains(listeners: &[DagListener]) -> Vec<FilterChain> {
    let mut hostnames = HashSet::new();
    let mut chains = Vec::new();
    for listener in listeners.iter().filter(|l| l.secret.is_some()) {
        if !hostnames.insert(listener.hostname.as_deref()) {
            debug!(listener = %listener.name, hostname = ?listener.hostname, "Skipping TLS listener with duplicate hostname");
            continue;
        }
        chains.extend(secure_filter_chain(listener));
    }
    chains
}

fn secure_filter_chain(listener: &DagListener) -> Option<FilterChain> {
    let secret = listener.secret.as_ref()?;
    let tls_context = DownstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            tls_certificate_sds_secret_configs: vec![SdsSecretConfig {
                name: secret_name(secret),
                sds_config: Some(ads_config_source()),
            }],
            ..Default::default()
        }),
        ..Default::default()
    };

    Some(FilterChain {
        filter_chain_match: listener
            .hostname
            .as_ref()
            .map(|host| FilterChainMatch { server_names: vec![host.clone()], ..Default::default() }),
        filters: vec![http_connection_manager(HTTPS_LISTENER_NAME)],
        transport_socket: Some(TransportSocket {
            name: "envoy.transport_sockets.tls".to_string(),
            config_type: Some(TransportSocketConfigType::TypedConfig(any_from_message(
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext",
                &tls_context,
            ))),
        }),
        ..Default::default()
    })
}

fn http_connection_manager(route_config_name: &str) -> Filter {
    let hcm = HttpConnectionManager {
        stat_prefix: route_config_name.to_string(),
        codec_type: CodecType::Auto as i32,
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            route_config_name: route_config_name.to_string(),
            config_source: Some(ads_config_source()),
        })),
        http_filters: vec![HttpFilter {
            name: "envoy.filters.http.router".to_string(),
            is_optional: false,
            disabled: false,
            config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
                "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router",
                &RouterFilter::default(),
            ))),
        }],
        ..Default::default()
    };

    Filter {
        name: "envoy.filters.network.http_connection_manager".to_string(),
        config_type: Some(FilterConfigType::TypedConfig(any_from_message(HCM_TYPE_URL, &hcm))),
    }
}

/// Build SDS secrets for every certificate referenced by a listener
pub fn secrets_from_dag(dag: &Dag) -> Result<Vec<BuiltResource>> {
    dag.secrets().values().map(|secret| build_secret(secret)).collect()
}

fn build_secret(secret: &Arc<DomainSecret>) -> Result<BuiltResource> {
    let name = secret_name(secret);
    let chain = secret
        .certificate_chain()
        .ok_or_else(|| Error::internal(format!("secret {} lost its certificate chain", name)))?;
    let key = secret
        .private_key()
        .ok_or_else(|| Error::internal(format!("secret {} lost its private key", name)))?;

    let envoy_secret = Secret {
        name: name.clone(),
        r#type: Some(secret::Type::TlsCertificate(TlsCertificate {
            certificate_chain: Some(DataSource {
                specifier: Some(Specifier::InlineString(chain.to_string())),
                ..Default::default()
            }),
            private_key: Some(DataSource {
                specifier: Some(Specifier::InlineString(key.to_string())),
                ..Default::default()
            }),
            ..Default::default()
        })),
    };

    Ok(built(name, SECRET_TYPE_URL, &envoy_secret))
}
