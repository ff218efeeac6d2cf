//! # Equality Checks
//!
//! Desired-vs-current comparisons used to keep reconciles idempotent. Each
//! service check ignores the fields the store assigns dynamically and,
//! when something relevant differs, returns the current object with the
//! desired values patched in. `None` means no write is needed.

use crate::domain::{Condition, GatewayStatus, Service};

/// ClusterIP services: the cluster IP is assigned by the store.
pub fn cluster_ip_service_changed(current: &Service, expected: &Service) -> Option<Service> {
    let mut updated = current.clone();
    let mut changed = false;

    if current.spec.ports != expected.spec.ports {
        updated.spec.ports = expected.spec.ports.clone();
        changed = true;
    }
    changed |= sync_common(&mut updated, current, expected, false);

    changed.then_some(updated)
}

/// LoadBalancer services: node ports and the health check node port are
/// assigned by the store, so ports compare field by field.
pub fn load_balancer_service_changed(current: &Service, expected: &Service) -> Option<Service> {
    let mut updated = current.clone();
    let mut changed = false;

    if current.spec.ports.len() != expected.spec.ports.len() {
        updated.spec.ports = expected.spec.ports.clone();
        changed = true;
    } else {
        for (port, wanted) in updated.spec.ports.iter_mut().zip(&expected.spec.ports) {
            if port.name != wanted.name
                || port.protocol != wanted.protocol
                || port.port != wanted.port
                || port.target_port != wanted.target_port
            {
                port.name = wanted.name.clone();
                port.protocol = wanted.protocol;
                port.port = wanted.port;
                port.target_port = wanted.target_port;
                changed = true;
            }
        }
    }
    changed |= sync_common(&mut updated, current, expected, true);

    changed.then_some(updated)
}

/// NodePort services: node ports are chosen by us, so ports compare whole.
pub fn node_port_service_changed(current: &Service, expected: &Service) -> Option<Service> {
    let mut updated = current.clone();
    let mut changed = false;

    if current.spec.ports != expected.spec.ports {
        updated.spec.ports = expected.spec.ports.clone();
        changed = true;
    }
    changed |= sync_common(&mut updated, current, expected, true);

    changed.then_some(updated)
}

fn sync_common(updated: &mut Service, current: &Service, expected: &Service, external: bool) -> bool {
    let mut changed = false;

    if current.spec.selector != expected.spec.selector {
        updated.spec.selector = expected.spec.selector.clone();
        changed = true;
    }
    if current.spec.session_affinity != expected.spec.session_affinity {
        updated.spec.session_affinity = expected.spec.session_affinity;
        changed = true;
    }
    if current.spec.type_ != expected.spec.type_ {
        updated.spec.type_ = expected.spec.type_;
        changed = true;
    }

    if external {
        if current.spec.external_traffic_policy != expected.spec.external_traffic_policy {
            updated.spec.external_traffic_policy = expected.spec.external_traffic_policy;
            changed = true;
        }
        if current.metadata.annotations != expected.metadata.annotations {
            updated.metadata.annotations = expected.metadata.annotations.clone();
            changed = true;
        }
    }

    changed
}

/// Condition lists differ, ignoring order and transition times
pub fn conditions_changed(current: &[Condition], expected: &[Condition]) -> bool {
    if current.len() != expected.len() {
        return true;
    }
    expected.iter().any(|want| !current.iter().any(|have| have.same_state(want)))
}

pub fn gateway_status_changed(current: &GatewayStatus, expected: &GatewayStatus) -> bool {
    current.addresses != expected.addresses || conditions_changed(&current.conditions, &expected.conditions)
}
