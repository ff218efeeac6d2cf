//! Domain layer
//!
//! Resource records watched by the control plane. These are plain data:
//! no store or cache access, only small helpers over their own fields.

pub mod condition;
pub mod envoy;
pub mod gateway;
pub mod meta;
pub mod resource;
pub mod route;
pub mod secret;
pub mod selector;
pub mod service;

pub use condition::{
    find_condition, is_condition_true, Condition, ConditionStatus, CONDITION_ADMITTED,
    CONDITION_AVAILABLE, CONDITION_READY, CONDITION_SCHEDULED,
};
pub use envoy::{
    ContainerPort, Envoy, EnvoySpec, EnvoyStatus, LoadBalancerProviderType, LoadBalancerScope,
    LoadBalancerStrategy, NetworkPublishing, NetworkPublishingType, ENVOY_FINALIZER,
    OWNING_ENVOY_NAME_LABEL, OWNING_ENVOY_NS_LABEL,
};
pub use gateway::{
    AddressType, Gateway, GatewayAddress, GatewayClass, GatewayClassSpec, GatewayClassStatus,
    GatewaySpec, GatewayStatus, GatewayTlsConfig, Listener, ObjectReference, ProtocolType,
    RouteBindingSelector, GATEWAY_API_GROUP, KIND_HTTP_ROUTE, KIND_SECRET,
};
pub use meta::{NamespacedName, ObjectMeta};
pub use resource::{Resource, ResourceKind};
pub use route::{
    HttpPathMatch, HttpRoute, HttpRouteForwardTo, HttpRouteMatch, HttpRouteRule, HttpRouteSpec,
    HttpRouteStatus, PathMatchType, RouteTlsConfig,
};
pub use secret::Secret;
pub use selector::{LabelSelector, LabelSelectorRequirement, SelectorOperator};
pub use service::{
    ExternalTrafficPolicy, PortProtocol, Service, ServicePort, ServiceSpec, ServiceType,
    SessionAffinity,
};
