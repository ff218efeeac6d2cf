//! Envoy fleet resources, whose owned Service fronts the data plane.

use super::condition::Condition;
use super::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Label on owned objects naming the owning Envoy
pub const OWNING_ENVOY_NAME_LABEL: &str = "meridian.dev/owning-envoy-name";
/// Label on owned objects naming the owning Envoy's namespace
pub const OWNING_ENVOY_NS_LABEL: &str = "meridian.dev/owning-envoy-namespace";
/// Finalizer guarding owned-object cleanup
pub const ENVOY_FINALIZER: &str = "meridian.dev/envoy-finalizer";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPublishingType {
    #[default]
    LoadBalancerService,
    NodePortService,
    ClusterIPService,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancerScope {
    #[default]
    External,
    Internal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadBalancerProviderType {
    #[default]
    AWS,
    Azure,
    GCP,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderLoadBalancerParameters {
    #[serde(rename = "type")]
    pub type_: LoadBalancerProviderType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalancerStrategy {
    pub scope: LoadBalancerScope,
    pub provider_parameters: ProviderLoadBalancerParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub port_number: u32,
}

impl ContainerPort {
    pub fn new<S: Into<String>>(name: S, port_number: u32) -> Self {
        Self { name: name.into(), port_number }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkPublishing {
    #[serde(rename = "type")]
    pub type_: NetworkPublishingType,
    pub load_balancer: LoadBalancerStrategy,
    pub container_ports: Vec<ContainerPort>,
}

impl Default for NetworkPublishing {
    fn default() -> Self {
        Self {
            type_: NetworkPublishingType::default(),
            load_balancer: LoadBalancerStrategy::default(),
            container_ports: vec![ContainerPort::new("http", 8080), ContainerPort::new("https", 8443)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvoySpec {
    pub network_publishing: NetworkPublishing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvoyStatus {
    pub available_envoys: u32,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envoy {
    pub metadata: ObjectMeta,
    pub spec: EnvoySpec,
    pub status: EnvoyStatus,
}
