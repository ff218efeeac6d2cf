//! Object identity and metadata shared by every watched kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace plus name. Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new<N: Into<String>, M: Into<String>>(namespace: N, name: M) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// Key for a cluster-scoped object
    pub fn cluster_scoped<M: Into<String>>(name: M) -> Self {
        Self { namespace: String::new(), name: name.into() }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Metadata carried by every resource record.
///
/// `generation` and `resource_version` are owned by the object store: the
/// former moves only when the spec changes, the latter on every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    pub generation: i64,
    pub resource_version: u64,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new<N: Into<String>, M: Into<String>>(namespace: N, name: M) -> Self {
        Self { namespace: namespace.into(), name: name.into(), ..Default::default() }
    }

    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// True once a delete has been requested but finalizers still hold the object
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_empty_namespace() {
        assert_eq!(NamespacedName::cluster_scoped("contour").to_string(), "contour");
        assert_eq!(NamespacedName::new("default", "echo").to_string(), "default/echo");
    }

    #[test]
    fn finalizer_lookup() {
        let mut meta = ObjectMeta::new("projectcontour", "envoy");
        assert!(!meta.has_finalizer("meridian.dev/envoy-finalizer"));
        meta.finalizers.push("meridian.dev/envoy-finalizer".to_string());
        assert!(meta.has_finalizer("meridian.dev/envoy-finalizer"));
        assert!(!meta.is_deleting());
    }
}
