use super::validate_hostname;
use crate::cache::CacheSnapshot;
use crate::domain::{HttpRoute, Listener, NamespacedName, PathMatchType, KIND_HTTP_ROUTE};
use crate::errors::{Error, ErrorAggregate, Result};

/// Whether the selected gateway accepts a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteBinding {
    Bound,
    /// Nothing binds the route; the message says why
    Unbound(String),
}

/// A listener binds HTTPRoutes whose labels its selector matches
pub fn listener_binds(listener: &Listener, route: &HttpRoute) -> Result<bool> {
    if listener.routes.kind != KIND_HTTP_ROUTE {
        return Ok(false);
    }
    listener.routes.selector.matches(&route.metadata.labels)
}

/// Check the route against every listener of the selected gateway
pub fn route_binding(route: &HttpRoute, cache: &CacheSnapshot) -> RouteBinding {
    let Some(gateway) = cache.gateway() else {
        return RouteBinding::Unbound("no gateway is selected".to_string());
    };

    let mut selector_errors = Vec::new();
    for listener in &gateway.spec.listeners {
        match listener_binds(listener, route) {
            Ok(true) => return RouteBinding::Bound,
            Ok(false) => {}
            Err(e) => selector_errors.push(e.to_string()),
        }
    }

    let mut message = format!("no listener of gateway {} selects this route", gateway.metadata.key());
    if !selector_errors.is_empty() {
        message.push_str(&format!(": {}", selector_errors.join(", ")));
    }
    RouteBinding::Unbound(message)
}

/// Check an HTTPRoute for unsupported fields and dangling Service
/// references. Missing Services are retryable since they may be created
/// shortly.
pub fn validate_http_route(route: &HttpRoute, cache: &CacheSnapshot) -> Result<()> {
    let mut errors = Vec::new();

    if route.spec.tls.is_some() {
        errors.push(Error::validation_field("route TLS is not supported", "spec.tls"));
    }

    for (i, hostname) in route.spec.hostnames.iter().enumerate() {
        if let Err(e) = validate_hostname(hostname, &format!("spec.hostnames[{}]", i)) {
            errors.push(e);
        }
    }

    for (i, rule) in route.spec.rules.iter().enumerate() {
        let field = format!("spec.rules[{}]", i);

        for (j, route_match) in rule.matches.iter().enumerate() {
            if route_match.path.type_ != PathMatchType::Prefix {
                errors.push(Error::validation_field(
                    format!("path match type {:?} is not supported", route_match.path.type_),
                    format!("{}.matches[{}].path.type", field, j),
                ));
            }
        }

        if rule.forward_to.is_empty() {
            errors.push(Error::validation_field("at least one forwardTo is required", format!("{}.forwardTo", field)));
        }

        for (j, forward) in rule.forward_to.iter().enumerate() {
            let forward_field = format!("{}.forwardTo[{}]", field, j);
            let (Some(service_name), Some(port)) = (&forward.service_name, forward.port) else {
                errors.push(Error::validation_field("serviceName and port are required", forward_field));
                continue;
            };

            let key = NamespacedName::new(route.metadata.namespace.clone(), service_name.clone());
            match cache.lookup_service(&key) {
                None => errors.push(Error::reference("Service", key.to_string(), "service does not exist")),
                Some(service) if service.port(port).is_none() => errors.push(Error::reference(
                    "Service",
                    key.to_string(),
                    format!("service has no port {}", port),
                )),
                Some(_) => {}
            }
        }
    }

    ErrorAggregate::maybe(errors)
}
