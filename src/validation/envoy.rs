use crate::cache::CacheSnapshot;
use crate::domain::Envoy;
use crate::errors::{Error, Result};
use std::collections::HashSet;

/// Only one Envoy may live in a namespace, and its container ports must
/// be unique and include both `http` and `https`.
pub fn validate_envoy(envoy: &Envoy, cache: &CacheSnapshot) -> Result<()> {
    let namespace = &envoy.metadata.namespace;
    let others = cache
        .envoys_in_namespace(namespace)
        .filter(|other| other.metadata.name != envoy.metadata.name)
        .count();
    if others > 0 {
        return Err(Error::validation(format!("other envoys exist in namespace {:?}", namespace)));
    }

    validate_container_ports(envoy)
}

fn validate_container_ports(envoy: &Envoy) -> Result<()> {
    let mut numbers = HashSet::new();
    let mut names = HashSet::new();

    for port in &envoy.spec.network_publishing.container_ports {
        if !numbers.insert(port.port_number) {
            return Err(Error::validation_field(
                format!("duplicate container port number {}", port.port_number),
                "spec.networkPublishing.containerPorts",
            ));
        }
        if !names.insert(port.name.as_str()) {
            return Err(Error::validation_field(
                format!("duplicate container port name {:?}", port.name),
                "spec.networkPublishing.containerPorts",
            ));
        }
    }

    if names.contains("http") && names.contains("https") {
        Ok(())
    } else {
        Err(Error::validation_field(
            "http and https container ports are unspecified",
            "spec.networkPublishing.containerPorts",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GatewaySelection, ResourceCache};
    use crate::domain::{ContainerPort, ObjectMeta};

    fn envoy(name: &str, ports: Option<Vec<ContainerPort>>) -> Envoy {
        let mut envoy = Envoy { metadata: ObjectMeta::new("projectcontour", name), ..Default::default() };
        if let Some(ports) = ports {
            envoy.spec.network_publishing.container_ports = ports;
        }
        envoy
    }

    #[test]
    fn container_ports() {
        let cases = vec![
            ("default http and https ports", None, true),
            (
                "non-default http and https ports",
                Some(vec![ContainerPort::new("http", 8081), ContainerPort::new("https", 8444)]),
                true,
            ),
            (
                "duplicate port names",
                Some(vec![ContainerPort::new("http", 8080), ContainerPort::new("http", 8443)]),
                false,
            ),
            (
                "duplicate port numbers",
                Some(vec![ContainerPort::new("http", 8080), ContainerPort::new("https", 8080)]),
                false,
            ),
            ("only http", Some(vec![ContainerPort::new("http", 8080)]), false),
            ("only https", Some(vec![ContainerPort::new("https", 8443)]), false),
            ("empty ports", Some(vec![]), false),
        ];

        for (description, ports, expected) in cases {
            let result = validate_container_ports(&envoy("envoy", ports));
            assert_eq!(result.is_ok(), expected, "{}", description);
        }
    }

    #[test]
    fn one_envoy_per_namespace() {
        let cache = ResourceCache::new(GatewaySelection::default());
        cache.insert(&envoy("first", None).into());
        assert!(validate_envoy(&envoy("first", None), &cache.snapshot()).is_ok());

        cache.insert(&envoy("second", None).into());
        let err = validate_envoy(&envoy("first", None), &cache.snapshot()).unwrap_err();
        assert!(err.to_string().contains("other envoys exist"));
    }
}
