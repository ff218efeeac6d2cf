//! HTTPRoute resources.

use super::condition::Condition;
use super::gateway::ObjectReference;
use super::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathMatchType {
    #[default]
    Prefix,
    Exact,
    RegularExpression,
    ImplementationSpecific,
}

impl fmt::Display for PathMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPathMatch {
    #[serde(rename = "type")]
    pub type_: PathMatchType,
    pub value: Option<String>,
}

impl HttpPathMatch {
    pub fn prefix<S: Into<String>>(value: S) -> Self {
        Self { type_: PathMatchType::Prefix, value: Some(value.into()) }
    }

    /// Path value, defaulting to `/`
    pub fn value_or_root(&self) -> &str {
        self.value.as_deref().unwrap_or("/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRouteMatch {
    pub path: HttpPathMatch,
}

/// A forwarding target. Both fields are optional on the wire but required
/// for the target to be routable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRouteForwardTo {
    pub service_name: Option<String>,
    pub port: Option<u32>,
    pub weight: u32,
}

impl Default for HttpRouteForwardTo {
    fn default() -> Self {
        Self { service_name: None, port: None, weight: 1 }
    }
}

impl HttpRouteForwardTo {
    pub fn service<S: Into<String>>(name: S, port: u32) -> Self {
        Self { service_name: Some(name.into()), port: Some(port), weight: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRouteRule {
    pub matches: Vec<HttpRouteMatch>,
    pub forward_to: Vec<HttpRouteForwardTo>,
}

impl HttpRouteRule {
    /// Matches of the rule; a rule without any matches `/` by prefix
    pub fn effective_matches(&self) -> Vec<HttpRouteMatch> {
        if self.matches.is_empty() {
            vec![HttpRouteMatch { path: HttpPathMatch::prefix("/") }]
        } else {
            self.matches.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteTlsConfig {
    pub certificate_ref: ObjectReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRouteSpec {
    pub hostnames: Vec<String>,
    pub rules: Vec<HttpRouteRule>,
    pub tls: Option<RouteTlsConfig>,
}

impl HttpRouteSpec {
    /// Hostnames, or the wildcard host when none are given
    pub fn effective_hosts(&self) -> Vec<String> {
        if self.hostnames.is_empty() {
            vec!["*".to_string()]
        } else {
            self.hostnames.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRouteStatus {
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRoute {
    pub metadata: ObjectMeta,
    pub spec: HttpRouteSpec,
    pub status: HttpRouteStatus,
}
