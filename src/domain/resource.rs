//! Closed set of watched kinds.

use super::condition::Condition;
use super::envoy::Envoy;
use super::gateway::{Gateway, GatewayClass};
use super::meta::{NamespacedName, ObjectMeta};
use super::route::HttpRoute;
use super::secret::Secret;
use super::service::Service;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    GatewayClass,
    Gateway,
    #[serde(rename = "HTTPRoute")]
    HttpRoute,
    Service,
    Secret,
    Envoy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::GatewayClass,
        ResourceKind::Gateway,
        ResourceKind::HttpRoute,
        ResourceKind::Service,
        ResourceKind::Secret,
        ResourceKind::Envoy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatewayClass => "GatewayClass",
            Self::Gateway => "Gateway",
            Self::HttpRoute => "HTTPRoute",
            Self::Service => "Service",
            Self::Secret => "Secret",
            Self::Envoy => "Envoy",
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::GatewayClass)
    }

    /// Kinds that report status conditions
    pub fn has_status(&self) -> bool {
        !matches!(self, Self::Service | Self::Secret)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource record of any watched kind, tagged by `kind` in manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    GatewayClass(GatewayClass),
    Gateway(Gateway),
    #[serde(rename = "HTTPRoute")]
    HttpRoute(HttpRoute),
    Service(Service),
    Secret(Secret),
    Envoy(Envoy),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::GatewayClass(_) => ResourceKind::GatewayClass,
            Self::Gateway(_) => ResourceKind::Gateway,
            Self::HttpRoute(_) => ResourceKind::HttpRoute,
            Self::Service(_) => ResourceKind::Service,
            Self::Secret(_) => ResourceKind::Secret,
            Self::Envoy(_) => ResourceKind::Envoy,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::GatewayClass(r) => &r.metadata,
            Self::Gateway(r) => &r.metadata,
            Self::HttpRoute(r) => &r.metadata,
            Self::Service(r) => &r.metadata,
            Self::Secret(r) => &r.metadata,
            Self::Envoy(r) => &r.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::GatewayClass(r) => &mut r.metadata,
            Self::Gateway(r) => &mut r.metadata,
            Self::HttpRoute(r) => &mut r.metadata,
            Self::Service(r) => &mut r.metadata,
            Self::Secret(r) => &mut r.metadata,
            Self::Envoy(r) => &mut r.metadata,
        }
    }

    pub fn key(&self) -> NamespacedName {
        self.meta().key()
    }

    pub fn conditions(&self) -> Option<&[Condition]> {
        match self {
            Self::GatewayClass(r) => Some(&r.status.conditions),
            Self::Gateway(r) => Some(&r.status.conditions),
            Self::HttpRoute(r) => Some(&r.status.conditions),
            Self::Envoy(r) => Some(&r.status.conditions),
            Self::Service(_) | Self::Secret(_) => None,
        }
    }

    pub fn conditions_mut(&mut self) -> Option<&mut Vec<Condition>> {
        match self {
            Self::GatewayClass(r) => Some(&mut r.status.conditions),
            Self::Gateway(r) => Some(&mut r.status.conditions),
            Self::HttpRoute(r) => Some(&mut r.status.conditions),
            Self::Envoy(r) => Some(&mut r.status.conditions),
            Self::Service(_) | Self::Secret(_) => None,
        }
    }

    /// Same kind and same desired state. Metadata other than labels and
    /// annotations, and status, are ignored.
    pub fn spec_eq(&self, other: &Resource) -> bool {
        let same_spec = match (self, other) {
            (Self::GatewayClass(a), Self::GatewayClass(b)) => a.spec == b.spec,
            (Self::Gateway(a), Self::Gateway(b)) => a.spec == b.spec,
            (Self::HttpRoute(a), Self::HttpRoute(b)) => a.spec == b.spec,
            (Self::Service(a), Self::Service(b)) => a.spec == b.spec,
            (Self::Secret(a), Self::Secret(b)) => a.type_ == b.type_ && a.data == b.data,
            (Self::Envoy(a), Self::Envoy(b)) => a.spec == b.spec,
            _ => false,
        };
        same_spec
            && self.meta().labels == other.meta().labels
            && self.meta().annotations == other.meta().annotations
    }

    /// Copy status from `other` when both are the same kind
    pub fn copy_status_from(&mut self, other: &Resource) {
        match (self, other) {
            (Self::GatewayClass(a), Self::GatewayClass(b)) => a.status = b.status.clone(),
            (Self::Gateway(a), Self::Gateway(b)) => a.status = b.status.clone(),
            (Self::HttpRoute(a), Self::HttpRoute(b)) => a.status = b.status.clone(),
            (Self::Envoy(a), Self::Envoy(b)) => a.status = b.status.clone(),
            _ => {}
        }
    }
}

macro_rules! resource_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Resource {
                fn from(value: $ty) -> Self {
                    Resource::$variant(value)
                }
            }
        )*
    };
}

resource_from! {
    GatewayClass => GatewayClass,
    Gateway => Gateway,
    HttpRoute => HttpRoute,
    Service => Service,
    Secret => Secret,
    Envoy => Envoy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tagged_manifest() {
        let yaml = r#"
kind: HTTPRoute
apiVersion: networking.x-k8s.io/v1alpha1
metadata:
  namespace: default
  name: echo
  labels:
    app: filter
spec:
  rules:
    - matches:
        - path:
            type: Prefix
            value: /
      forwardTo:
        - serviceName: echo
          port: 80
"#;
        let resource: Resource = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(resource.kind(), ResourceKind::HttpRoute);
        assert_eq!(resource.key(), NamespacedName::new("default", "echo"));
        match resource {
            Resource::HttpRoute(route) => {
                assert_eq!(route.spec.rules[0].forward_to[0].port, Some(80));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn spec_eq_ignores_status_and_versions() {
        let mut a = Gateway::default();
        a.spec.gateway_class_name = "contour".into();
        let mut b = a.clone();
        b.metadata.resource_version = 9;
        b.status.conditions.push(Condition::new(
            "Ready",
            crate::domain::ConditionStatus::True,
            "Valid",
            "",
        ));
        assert!(Resource::from(a.clone()).spec_eq(&Resource::from(b.clone())));

        b.spec.gateway_class_name = "other".into();
        assert!(!Resource::from(a).spec_eq(&Resource::from(b)));
    }
}
