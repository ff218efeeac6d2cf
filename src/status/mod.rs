//! # Status Cache
//!
//! Per-resource condition sets, written back to the object store through a
//! two-phase API: stage conditions on a [`StatusAccessor`], then call
//! [`StatusAccessor::commit`] on every exit path of the reconcile.
//!
//! Commits merge condition by condition. A condition already stored with a
//! newer `observedGeneration` than the staged one is left alone, so a slow
//! reconcile can never overwrite the verdict of a newer one.

pub mod gateway;

pub use gateway::sync_gateway;

use crate::domain::{
    Condition, ConditionStatus, GatewayAddress, NamespacedName, Resource, ResourceKind,
    CONDITION_AVAILABLE,
};
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::store::ObjectStore;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Kinds that carry a status subresource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusKind {
    GatewayClass,
    Gateway,
    HttpRoute,
    Envoy,
}

impl StatusKind {
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::GatewayClass => ResourceKind::GatewayClass,
            Self::Gateway => ResourceKind::Gateway,
            Self::HttpRoute => ResourceKind::HttpRoute,
            Self::Envoy => ResourceKind::Envoy,
        }
    }

    pub fn from_resource_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::GatewayClass => Some(Self::GatewayClass),
            ResourceKind::Gateway => Some(Self::Gateway),
            ResourceKind::HttpRoute => Some(Self::HttpRoute),
            ResourceKind::Envoy => Some(Self::Envoy),
            ResourceKind::Service | ResourceKind::Secret => None,
        }
    }
}

/// Last committed conditions of one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusEntry {
    pub conditions: BTreeMap<String, Condition>,
    pub observed_generation: i64,
}

impl StatusEntry {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.get(type_)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Status written to the store
    Updated,
    /// Stored status already matched
    Unchanged,
    /// Object no longer exists; its entry was dropped
    NotFound,
}

impl CommitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::NotFound => "not_found",
        }
    }
}

/// Condition state keyed by kind and object. Entries are sharded, so a
/// slow commit for one object never blocks another.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: DashMap<(StatusKind, NamespacedName), StatusEntry>,
    metrics: MetricsRecorder,
}

impl StatusCache {
    pub fn new(metrics: MetricsRecorder) -> Self {
        Self { entries: DashMap::new(), metrics }
    }

    /// Open a staging area for one object evaluated at `generation`
    pub fn accessor(&self, kind: StatusKind, key: &NamespacedName, generation: i64) -> StatusAccessor<'_> {
        let current = self
            .entries
            .get(&(kind, key.clone()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        StatusAccessor {
            cache: self,
            kind,
            key: key.clone(),
            generation,
            current,
            staged: BTreeMap::new(),
            removed: BTreeSet::new(),
            gateway_addresses: None,
        }
    }

    pub fn get(&self, kind: StatusKind, key: &NamespacedName) -> Option<StatusEntry> {
        self.entries.get(&(kind, key.clone())).map(|entry| entry.value().clone())
    }

    /// Drop the entry of a deleted object
    pub fn remove(&self, kind: StatusKind, key: &NamespacedName) -> bool {
        self.entries.remove(&(kind, key.clone())).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Staged status changes for one object
#[derive(Debug)]
pub struct StatusAccessor<'a> {
    cache: &'a StatusCache,
    kind: StatusKind,
    key: NamespacedName,
    generation: i64,
    current: StatusEntry,
    staged: BTreeMap<String, Condition>,
    removed: BTreeSet<String>,
    gateway_addresses: Option<Vec<GatewayAddress>>,
}

impl StatusAccessor<'_> {
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn key(&self) -> &NamespacedName {
        &self.key
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Staged condition of `type_`, falling back to the last committed one
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.staged.get(type_).or_else(|| self.current.condition(type_))
    }

    /// Mutable staged condition of `type_`, created with defaults on first
    /// use: `Available` starts Unknown/Pending, everything else False.
    pub fn condition(&mut self, type_: &str) -> &mut Condition {
        self.removed.remove(type_);
        let generation = self.generation;
        let committed = self.current.condition(type_).cloned();

        self.staged.entry(type_.to_string()).or_insert_with(|| {
            let mut condition = committed.unwrap_or_else(|| default_condition(type_));
            condition.observed_generation = generation;
            condition
        })
    }

    pub fn stage_condition<R: Into<String>, M: Into<String>>(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: R,
        message: M,
    ) {
        let condition = self.condition(type_);
        condition.status = status;
        condition.reason = reason.into();
        condition.message = message.into();
    }

    pub fn remove_condition(&mut self, type_: &str) {
        self.staged.remove(type_);
        self.removed.insert(type_.to_string());
    }

    /// Replace the addresses reported on a Gateway
    pub fn set_gateway_addresses(&mut self, addresses: Vec<GatewayAddress>) {
        self.gateway_addresses = Some(addresses);
    }

    /// Merge staged changes into the stored object and write them back if
    /// anything changed.
    pub async fn commit(self, store: &dyn ObjectStore) -> Result<CommitOutcome> {
        let resource_kind = self.kind.resource_kind();
        let outcome = match store.get(resource_kind, &self.key).await {
            Ok(mut stored) => {
                if self.merge_into(&mut stored)? {
                    match store.update_status(stored).await {
                        Ok(written) => {
                            self.remember(&written);
                            CommitOutcome::Updated
                        }
                        Err(e) if e.is_not_found() => self.forget(),
                        Err(e) => {
                            self.cache.metrics.record_status_commit(resource_kind.as_str(), "error");
                            return Err(e);
                        }
                    }
                } else {
                    self.remember(&stored);
                    CommitOutcome::Unchanged
                }
            }
            Err(e) if e.is_not_found() => self.forget(),
            Err(e) => {
                self.cache.metrics.record_status_commit(resource_kind.as_str(), "error");
                return Err(e);
            }
        };

        debug!(
            kind = %resource_kind,
            key = %self.key,
            generation = self.generation,
            outcome = outcome.as_str(),
            "Committed status"
        );
        self.cache.metrics.record_status_commit(resource_kind.as_str(), outcome.as_str());
        Ok(outcome)
    }

    /// Returns whether `stored` changed
    fn merge_into(&self, stored: &mut Resource) -> Result<bool> {
        let mut changed = match (self.kind, &mut *stored) {
            (StatusKind::Gateway, Resource::Gateway(gateway)) => match &self.gateway_addresses {
                Some(addresses) if gateway.status.addresses != *addresses => {
                    gateway.status.addresses = addresses.clone();
                    true
                }
                _ => false,
            },
            (StatusKind::GatewayClass, Resource::GatewayClass(_))
            | (StatusKind::HttpRoute, Resource::HttpRoute(_))
            | (StatusKind::Envoy, Resource::Envoy(_)) => false,
            (kind, other) => {
                return Err(Error::internal(format!(
                    "status for {:?} cannot be written to a {}",
                    kind,
                    other.kind()
                )))
            }
        };

        let conditions = stored
            .conditions_mut()
            .ok_or_else(|| Error::internal(format!("{} has no status conditions", self.kind.resource_kind())))?;
        changed |= merge_conditions(conditions, &self.staged, &self.removed, self.generation);
        Ok(changed)
    }

    fn remember(&self, stored: &Resource) {
        let conditions = stored
            .conditions()
            .unwrap_or_default()
            .iter()
            .map(|c| (c.type_.clone(), c.clone()))
            .collect();
        self.cache.entries.insert(
            (self.kind, self.key.clone()),
            StatusEntry { conditions, observed_generation: self.generation },
        );
    }

    fn forget(&self) -> CommitOutcome {
        self.cache.remove(self.kind, &self.key);
        CommitOutcome::NotFound
    }
}

fn default_condition(type_: &str) -> Condition {
    if type_ == CONDITION_AVAILABLE {
        Condition::new(type_, ConditionStatus::Unknown, "Pending", "Waiting for owned objects to converge")
    } else {
        Condition::new(type_, ConditionStatus::False, "NotReconciled", "Waiting for controller")
    }
}

/// Apply staged conditions and removals at `generation`. Returns whether
/// `conditions` changed.
pub fn merge_conditions(
    conditions: &mut Vec<Condition>,
    staged: &BTreeMap<String, Condition>,
    removed: &BTreeSet<String>,
    generation: i64,
) -> bool {
    let mut changed = false;

    for type_ in removed {
        let before = conditions.len();
        conditions.retain(|c| &c.type_ != type_ || c.observed_generation > generation);
        changed |= conditions.len() != before;
    }

    for (type_, wanted) in staged {
        match conditions.iter_mut().find(|c| &c.type_ == type_) {
            Some(existing) if existing.observed_generation > wanted.observed_generation => {
                debug!(
                    condition = %type_,
                    stored_generation = existing.observed_generation,
                    staged_generation = wanted.observed_generation,
                    "Skipping stale condition"
                );
            }
            Some(existing) => {
                if existing.same_state(wanted) {
                    continue;
                }
                let transitioned = existing.status != wanted.status;
                let last_transition_time =
                    if transitioned { Utc::now() } else { existing.last_transition_time };
                *existing = Condition { last_transition_time, ..wanted.clone() };
                changed = true;
            }
            None => {
                conditions.push(Condition { last_transition_time: Utc::now(), ..wanted.clone() });
                changed = true;
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressType, Envoy, Gateway, GatewayClass, ObjectMeta, CONDITION_ADMITTED, CONDITION_READY};
    use crate::store::InMemoryStore;

    async fn store_with_class() -> (InMemoryStore, NamespacedName) {
        let store = InMemoryStore::new();
        let class = GatewayClass { metadata: ObjectMeta::new("", "contour"), ..Default::default() };
        store.create(class.into()).await.unwrap();
        (store, NamespacedName::cluster_scoped("contour"))
    }

    #[test]
    fn defaults_for_new_conditions() {
        let cache = StatusCache::default();
        let key = NamespacedName::new("projectcontour", "envoy");
        let mut accessor = cache.accessor(StatusKind::Envoy, &key, 3);

        let available = accessor.condition(CONDITION_AVAILABLE).clone();
        assert_eq!(available.status, ConditionStatus::Unknown);
        assert_eq!(available.reason, "Pending");
        assert_eq!(available.observed_generation, 3);

        assert_eq!(accessor.condition(CONDITION_ADMITTED).status, ConditionStatus::False);
    }

    #[tokio::test]
    async fn commit_writes_then_reports_unchanged() {
        let (store, key) = store_with_class().await;
        let cache = StatusCache::default();

        let mut accessor = cache.accessor(StatusKind::GatewayClass, &key, 1);
        accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::True, "Valid", "Valid GatewayClass");
        assert_eq!(accessor.commit(&store).await.unwrap(), CommitOutcome::Updated);

        let mut accessor = cache.accessor(StatusKind::GatewayClass, &key, 1);
        accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::True, "Valid", "Valid GatewayClass");
        assert_eq!(accessor.commit(&store).await.unwrap(), CommitOutcome::Unchanged);

        let entry = cache.get(StatusKind::GatewayClass, &key).unwrap();
        assert_eq!(entry.condition(CONDITION_ADMITTED).unwrap().status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn stale_generation_never_overwrites_newer_condition() {
        let (store, key) = store_with_class().await;
        let cache = StatusCache::default();

        let mut newer = cache.accessor(StatusKind::GatewayClass, &key, 5);
        newer.stage_condition(CONDITION_ADMITTED, ConditionStatus::True, "Valid", "generation 5");
        newer.commit(&store).await.unwrap();

        let mut stale = cache.accessor(StatusKind::GatewayClass, &key, 4);
        stale.stage_condition(CONDITION_ADMITTED, ConditionStatus::False, "Invalid", "generation 4");
        assert_eq!(stale.commit(&store).await.unwrap(), CommitOutcome::Unchanged);

        let stored = store.get(ResourceKind::GatewayClass, &key).await.unwrap();
        let admitted = stored.conditions().unwrap().iter().find(|c| c.type_ == CONDITION_ADMITTED).unwrap();
        assert_eq!(admitted.observed_generation, 5);
        assert_eq!(admitted.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn transition_time_moves_only_on_status_change() {
        let (store, key) = store_with_class().await;
        let cache = StatusCache::default();

        let mut accessor = cache.accessor(StatusKind::GatewayClass, &key, 1);
        accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::False, "Invalid", "first");
        accessor.commit(&store).await.unwrap();
        let first = store.get(ResourceKind::GatewayClass, &key).await.unwrap().conditions().unwrap()[0].clone();

        let mut accessor = cache.accessor(StatusKind::GatewayClass, &key, 2);
        accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::False, "Invalid", "second");
        accessor.commit(&store).await.unwrap();
        let second = store.get(ResourceKind::GatewayClass, &key).await.unwrap().conditions().unwrap()[0].clone();

        assert_eq!(second.message, "second");
        assert_eq!(second.last_transition_time, first.last_transition_time);
    }

    #[tokio::test]
    async fn missing_object_converges_and_drops_entry() {
        let store = InMemoryStore::new();
        let cache = StatusCache::default();
        let key = NamespacedName::new("projectcontour", "gone");

        let mut accessor = cache.accessor(StatusKind::Envoy, &key, 1);
        accessor.stage_condition(CONDITION_AVAILABLE, ConditionStatus::True, "Available", "ok");
        assert_eq!(accessor.commit(&store).await.unwrap(), CommitOutcome::NotFound);
        assert!(cache.get(StatusKind::Envoy, &key).is_none());
    }

    #[test]
    fn mismatched_kind_is_an_error_not_a_panic() {
        let cache = StatusCache::default();
        let key = NamespacedName::new("projectcontour", "contour");
        let mut accessor = cache.accessor(StatusKind::HttpRoute, &key, 1);
        accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::True, "Valid", "ok");

        let mut envoy: Resource =
            Envoy { metadata: ObjectMeta::new("projectcontour", "contour"), ..Default::default() }.into();
        assert!(accessor.merge_into(&mut envoy).is_err());
    }

    #[test]
    fn gateway_addresses_merge_with_conditions() {
        let cache = StatusCache::default();
        let key = NamespacedName::new("projectcontour", "contour");
        let address = GatewayAddress { type_: Some(AddressType::IPAddress), value: "10.0.0.1".into() };

        let mut accessor = cache.accessor(StatusKind::Gateway, &key, 1);
        accessor.stage_condition(CONDITION_READY, ConditionStatus::True, "Ready", "ok");
        accessor.set_gateway_addresses(vec![address.clone()]);

        let mut gateway: Resource =
            Gateway { metadata: ObjectMeta::new("projectcontour", "contour"), ..Default::default() }.into();
        assert!(accessor.merge_into(&mut gateway).unwrap());
        assert!(!accessor.merge_into(&mut gateway).unwrap());

        let Resource::Gateway(gateway) = gateway else { unreachable!() };
        assert_eq!(gateway.status.addresses, vec![address]);
        assert_eq!(gateway.status.conditions[0].type_, CONDITION_READY);
    }
}
