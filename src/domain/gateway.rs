//! GatewayClass and Gateway resources.

use super::condition::Condition;
use super::meta::ObjectMeta;
use super::selector::LabelSelector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API group of the gateway resources
pub const GATEWAY_API_GROUP: &str = "networking.x-k8s.io";
/// Route kind listeners may bind
pub const KIND_HTTP_ROUTE: &str = "HTTPRoute";
/// Kind of a core Secret reference
pub const KIND_SECRET: &str = "Secret";

/// Typed reference to another object. An empty group is the core group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ObjectReference {
    pub fn secret<N: Into<String>>(name: N) -> Self {
        Self { group: String::new(), kind: KIND_SECRET.to_string(), name: name.into(), namespace: None }
    }

    /// Core-group `Secret`
    pub fn is_secret_ref(&self) -> bool {
        (self.group.is_empty() || self.group == "core") && self.kind == KIND_SECRET
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayClassSpec {
    pub controller: String,
    pub parameters_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayClassStatus {
    pub conditions: Vec<Condition>,
}

/// Cluster-scoped class naming the controller responsible for its Gateways
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayClass {
    pub metadata: ObjectMeta,
    pub spec: GatewayClassSpec,
    pub status: GatewayClassStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolType {
    #[default]
    Http,
    Https,
    Tls,
    Tcp,
    Udp,
}

impl ProtocolType {
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Https | Self::Tls)
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tls => "TLS",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayTlsConfig {
    pub certificate_ref: Option<ObjectReference>,
}

/// Which routes a listener accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteBindingSelector {
    pub group: Option<String>,
    pub kind: String,
    pub selector: LabelSelector,
}

impl Default for RouteBindingSelector {
    fn default() -> Self {
        Self { group: None, kind: KIND_HTTP_ROUTE.to_string(), selector: LabelSelector::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listener {
    pub hostname: Option<String>,
    pub port: u32,
    pub protocol: ProtocolType,
    pub tls: Option<GatewayTlsConfig>,
    pub routes: RouteBindingSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    IPAddress,
    NamedAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayAddress {
    #[serde(rename = "type", default)]
    pub type_: Option<AddressType>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySpec {
    pub gateway_class_name: String,
    pub listeners: Vec<Listener>,
    pub addresses: Vec<GatewayAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayStatus {
    pub addresses: Vec<GatewayAddress>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gateway {
    pub metadata: ObjectMeta,
    pub spec: GatewaySpec,
    pub status: GatewayStatus,
}
