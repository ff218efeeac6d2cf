//! The `envoy` Service fronting an Envoy fleet.

use super::{labels_exist, owner_labels};
use crate::domain::{
    Envoy, ExternalTrafficPolicy, LoadBalancerProviderType, LoadBalancerScope,
    NetworkPublishingType, NamespacedName, ObjectMeta, PortProtocol, Resource, ResourceKind,
    Service, ServicePort, ServiceSpec, ServiceType, SessionAffinity,
};
use crate::equality::{
    cluster_ip_service_changed, load_balancer_service_changed, node_port_service_changed,
};
use crate::errors::{Error, Result};
use crate::store::ObjectStore;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const ENVOY_SERVICE_NAME: &str = "envoy";
pub const ENVOY_SERVICE_HTTP_PORT: u32 = 80;
pub const ENVOY_SERVICE_HTTPS_PORT: u32 = 443;
pub const ENVOY_NODE_PORT_HTTP_PORT: u32 = 30080;
pub const ENVOY_NODE_PORT_HTTPS_PORT: u32 = 30443;

/// Puts an AWS ELB in TCP mode so HTTPS is not negotiated at the edge
const AWS_LB_BACKEND_PROTO_ANNOTATION: &str = "service.beta.kubernetes.io/aws-load-balancer-backend-protocol";
const AWS_INTERNAL_LB_ANNOTATION: &str = "service.beta.kubernetes.io/aws-load-balancer-internal";
const AZURE_INTERNAL_LB_ANNOTATION: &str = "service.beta.kubernetes.io/azure-load-balancer-internal";
const GCP_LB_TYPE_ANNOTATION: &str = "cloud.google.com/load-balancer-type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    Created,
    Updated,
    Unchanged,
    /// A Service with our name exists but is not ours
    NotOwned,
    Deleted,
    Absent,
}

fn load_balancer_annotations(provider: LoadBalancerProviderType) -> &'static [(&'static str, &'static str)] {
    match provider {
        LoadBalancerProviderType::AWS => &[(AWS_LB_BACKEND_PROTO_ANNOTATION, "tcp")],
        LoadBalancerProviderType::Azure | LoadBalancerProviderType::GCP => &[],
    }
}

fn internal_load_balancer_annotations(provider: LoadBalancerProviderType) -> &'static [(&'static str, &'static str)] {
    match provider {
        LoadBalancerProviderType::AWS => &[(AWS_INTERNAL_LB_ANNOTATION, "0.0.0.0/0")],
        LoadBalancerProviderType::Azure => &[(AZURE_INTERNAL_LB_ANNOTATION, "true")],
        LoadBalancerProviderType::GCP => &[(GCP_LB_TYPE_ANNOTATION, "Internal")],
    }
}

pub fn service_key(envoy: &Envoy) -> NamespacedName {
    NamespacedName::new(envoy.metadata.namespace.clone(), ENVOY_SERVICE_NAME)
}

/// The Service `envoy` should have
pub fn desired_service(envoy: &Envoy) -> Service {
    let publishing = &envoy.spec.network_publishing;
    let node_ports = publishing.type_ == NetworkPublishingType::NodePortService;

    let ports = publishing
        .container_ports
        .iter()
        .filter_map(|container_port| {
            let (port, node_port) = match container_port.name.as_str() {
                "http" => (ENVOY_SERVICE_HTTP_PORT, ENVOY_NODE_PORT_HTTP_PORT),
                "https" => (ENVOY_SERVICE_HTTPS_PORT, ENVOY_NODE_PORT_HTTPS_PORT),
                _ => return None,
            };
            Some(ServicePort {
                name: container_port.name.clone(),
                protocol: PortProtocol::Tcp,
                port,
                target_port: container_port.port_number,
                node_port: node_ports.then_some(node_port),
                app_protocol: None,
            })
        })
        .collect();

    let mut annotations = BTreeMap::new();
    let type_ = match publishing.type_ {
        NetworkPublishingType::LoadBalancerService => {
            let provider = publishing.load_balancer.provider_parameters.type_;
            let mut pairs = load_balancer_annotations(provider).to_vec();
            if publishing.load_balancer.scope == LoadBalancerScope::Internal {
                pairs.extend_from_slice(internal_load_balancer_annotations(provider));
            }
            annotations.extend(pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
            ServiceType::LoadBalancer
        }
        NetworkPublishingType::NodePortService => ServiceType::NodePort,
        NetworkPublishingType::ClusterIPService => ServiceType::ClusterIP,
    };
    let external_traffic_policy =
        (type_ != ServiceType::ClusterIP).then_some(ExternalTrafficPolicy::Local);

    let mut metadata = ObjectMeta::new(envoy.metadata.namespace.clone(), ENVOY_SERVICE_NAME)
        .with_labels(owner_labels(envoy));
    metadata.annotations = annotations;

    Service {
        metadata,
        spec: ServiceSpec {
            ports,
            selector: BTreeMap::from([("app".to_string(), "envoy".to_string())]),
            type_,
            cluster_ip: None,
            external_traffic_policy,
            session_affinity: SessionAffinity::None,
            health_check_node_port: None,
        },
    }
}

/// Create the Service if missing, or bring an owned one in line with the
/// desired state. Services we do not own are left alone.
pub async fn ensure_service(store: &dyn ObjectStore, envoy: &Envoy) -> Result<ServiceOutcome> {
    let desired = desired_service(envoy);
    let key = service_key(envoy);

    let current = match store.get(ResourceKind::Service, &key).await {
        Ok(Resource::Service(service)) => service,
        Ok(other) => {
            return Err(Error::internal(format!("store returned a {} for Service {}", other.kind(), key)))
        }
        Err(e) if e.is_not_found() => {
            store.create(desired.into()).await?;
            info!(service = %key, "Created envoy service");
            return Ok(ServiceOutcome::Created);
        }
        Err(e) => return Err(e),
    };

    if !labels_exist(&current.metadata, &owner_labels(envoy)) {
        debug!(service = %key, "Service exists but is not owned, leaving it alone");
        return Ok(ServiceOutcome::NotOwned);
    }

    let updated = match envoy.spec.network_publishing.type_ {
        NetworkPublishingType::NodePortService => node_port_service_changed(&current, &desired),
        NetworkPublishingType::ClusterIPService => cluster_ip_service_changed(&current, &desired),
        NetworkPublishingType::LoadBalancerService => load_balancer_service_changed(&current, &desired),
    };

    match updated {
        Some(service) => {
            store.update(service.into()).await?;
            info!(service = %key, "Updated envoy service");
            Ok(ServiceOutcome::Updated)
        }
        None => Ok(ServiceOutcome::Unchanged),
    }
}

/// Delete the Service if it exists and is owned by `envoy`
pub async fn ensure_service_deleted(store: &dyn ObjectStore, envoy: &Envoy) -> Result<ServiceOutcome> {
    let key = service_key(envoy);
    let current = match store.get(ResourceKind::Service, &key).await {
        Ok(resource) => resource,
        Err(e) if e.is_not_found() => return Ok(ServiceOutcome::Absent),
        Err(e) => return Err(e),
    };

    if !labels_exist(current.meta(), &owner_labels(envoy)) {
        return Ok(ServiceOutcome::NotOwned);
    }

    match store.delete(ResourceKind::Service, &key).await {
        Ok(()) => {
            info!(service = %key, "Deleted envoy service");
            Ok(ServiceOutcome::Deleted)
        }
        Err(e) if e.is_not_found() => Ok(ServiceOutcome::Absent),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envoy::ProviderLoadBalancerParameters;
    use crate::domain::LoadBalancerStrategy;
    use crate::store::InMemoryStore;

    fn envoy(type_: NetworkPublishingType) -> Envoy {
        let mut envoy = Envoy { metadata: ObjectMeta::new("projectcontour", "contour"), ..Default::default() };
        envoy.spec.network_publishing.type_ = type_;
        envoy
    }

    #[test]
    fn desired_load_balancer_service() {
        let mut e = envoy(NetworkPublishingType::LoadBalancerService);
        e.spec.network_publishing.load_balancer = LoadBalancerStrategy {
            scope: LoadBalancerScope::Internal,
            provider_parameters: ProviderLoadBalancerParameters { type_: LoadBalancerProviderType::AWS },
        };
        let svc = desired_service(&e);

        assert_eq!(svc.metadata.name, ENVOY_SERVICE_NAME);
        assert_eq!(svc.spec.type_, ServiceType::LoadBalancer);
        assert_eq!(svc.spec.external_traffic_policy, Some(ExternalTrafficPolicy::Local));
        assert_eq!(svc.spec.ports.len(), 2);
        assert_eq!((svc.spec.ports[0].port, svc.spec.ports[0].target_port), (80, 8080));
        assert_eq!((svc.spec.ports[1].port, svc.spec.ports[1].target_port), (443, 8443));
        assert_eq!(svc.metadata.annotations.get(AWS_LB_BACKEND_PROTO_ANNOTATION).map(String::as_str), Some("tcp"));
        assert_eq!(svc.metadata.annotations.get(AWS_INTERNAL_LB_ANNOTATION).map(String::as_str), Some("0.0.0.0/0"));
        assert!(labels_exist(&svc.metadata, &owner_labels(&e)));
    }

    #[test]
    fn desired_node_port_and_cluster_ip_services() {
        let svc = desired_service(&envoy(NetworkPublishingType::NodePortService));
        assert_eq!(svc.spec.ports[0].node_port, Some(ENVOY_NODE_PORT_HTTP_PORT));
        assert_eq!(svc.spec.ports[1].node_port, Some(ENVOY_NODE_PORT_HTTPS_PORT));

        let svc = desired_service(&envoy(NetworkPublishingType::ClusterIPService));
        assert_eq!(svc.spec.type_, ServiceType::ClusterIP);
        assert_eq!(svc.spec.external_traffic_policy, None);
        assert!(svc.metadata.annotations.is_empty());
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let store = InMemoryStore::new();
        let e = envoy(NetworkPublishingType::LoadBalancerService);

        assert_eq!(ensure_service(&store, &e).await.unwrap(), ServiceOutcome::Created);
        assert_eq!(ensure_service(&store, &e).await.unwrap(), ServiceOutcome::Unchanged);

        let mut changed = e.clone();
        changed.spec.network_publishing.type_ = NetworkPublishingType::NodePortService;
        assert_eq!(ensure_service(&store, &changed).await.unwrap(), ServiceOutcome::Updated);
        assert_eq!(ensure_service(&store, &changed).await.unwrap(), ServiceOutcome::Unchanged);

        assert_eq!(ensure_service_deleted(&store, &e).await.unwrap(), ServiceOutcome::Deleted);
        assert_eq!(ensure_service_deleted(&store, &e).await.unwrap(), ServiceOutcome::Absent);
    }

    #[tokio::test]
    async fn foreign_service_is_left_alone() {
        let store = InMemoryStore::new();
        let foreign = Service { metadata: ObjectMeta::new("projectcontour", ENVOY_SERVICE_NAME), ..Default::default() };
        store.create(foreign.into()).await.unwrap();

        let e = envoy(NetworkPublishingType::ClusterIPService);
        assert_eq!(ensure_service(&store, &e).await.unwrap(), ServiceOutcome::NotOwned);
        assert_eq!(ensure_service_deleted(&store, &e).await.unwrap(), ServiceOutcome::NotOwned);
        assert!(store.get(ResourceKind::Service, &service_key(&e)).await.is_ok());
    }
}
