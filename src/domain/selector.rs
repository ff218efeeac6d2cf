//! Label selectors binding routes to gateway listeners.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            match_expressions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Evaluate the selector against an object's labels.
    ///
    /// An empty selector matches everything. A malformed requirement is an
    /// error rather than a silent non-match.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool> {
        if self.is_empty() {
            return Ok(true);
        }

        for (key, value) in &self.match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }

        for req in &self.match_expressions {
            if !requirement_matches(req, labels)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn requirement_matches(
    req: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    match req.operator {
        SelectorOperator::In | SelectorOperator::NotIn if req.values.is_empty() => {
            Err(Error::validation_field(
                format!("operator {:?} on key {:?} requires at least one value", req.operator, req.key),
                "selector.matchExpressions",
            ))
        }
        SelectorOperator::Exists | SelectorOperator::DoesNotExist if !req.values.is_empty() => {
            Err(Error::validation_field(
                format!("operator {:?} on key {:?} takes no values", req.operator, req.key),
                "selector.matchExpressions",
            ))
        }
        SelectorOperator::In => {
            Ok(labels.get(&req.key).is_some_and(|v| req.values.iter().any(|want| want == v)))
        }
        SelectorOperator::NotIn => {
            Ok(labels.get(&req.key).is_none_or(|v| req.values.iter().all(|want| want != v)))
        }
        SelectorOperator::Exists => Ok(labels.contains_key(&req.key)),
        SelectorOperator::DoesNotExist => Ok(!labels.contains_key(&req.key)),
    }
}
