//! # Owned Object Provisioning
//!
//! Side effects of reconciling an Envoy: its front Service and the
//! finalizer that guarantees the Service is cleaned up.

pub mod finalizer;
pub mod service;

pub use finalizer::{ensure_finalizer, ensure_finalizer_removed};
pub use service::{desired_service, ensure_service, ensure_service_deleted, ServiceOutcome};

use crate::domain::{Envoy, ObjectMeta, OWNING_ENVOY_NAME_LABEL, OWNING_ENVOY_NS_LABEL};
use std::collections::BTreeMap;

/// Labels marking an object as owned by `envoy`
pub fn owner_labels(envoy: &Envoy) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNING_ENVOY_NAME_LABEL.to_string(), envoy.metadata.name.clone()),
        (OWNING_ENVOY_NS_LABEL.to_string(), envoy.metadata.namespace.clone()),
    ])
}

/// Every label in `labels` is present on `meta` with the same value
pub fn labels_exist(meta: &ObjectMeta, labels: &BTreeMap<String, String>) -> bool {
    labels.iter().all(|(k, v)| meta.labels.get(k) == Some(v))
}
