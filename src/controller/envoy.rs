//! Envoy reconciler: owned Service, finalizer and `Available`.

use super::{ControllerContext, Reconciler};
use crate::domain::{ConditionStatus, Envoy, NamespacedName, Resource, ResourceKind, CONDITION_AVAILABLE};
use crate::errors::{Error, Result};
use crate::provision::service::service_key;
use crate::provision::{
    ensure_finalizer, ensure_finalizer_removed, ensure_service, ensure_service_deleted, ServiceOutcome,
};
use crate::status::StatusKind;
use crate::validation::validate_envoy;
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub const REASON_SERVICE_AVAILABLE: &str = "ServiceAvailable";
pub const REASON_SERVICE_NOT_OWNED: &str = "ServiceNotOwned";

#[derive(Debug)]
pub struct EnvoyReconciler {
    ctx: ControllerContext,
}

impl EnvoyReconciler {
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }

    /// Tear down owned objects, then release the finalizer
    async fn finalize(&self, envoy: &Envoy) -> Result<()> {
        let outcome = ensure_service_deleted(self.ctx.store.as_ref(), envoy).await?;
        debug!(?outcome, "Owned service cleanup");
        ensure_finalizer_removed(self.ctx.store.as_ref(), envoy).await?;
        self.ctx.status.remove(StatusKind::Envoy, &envoy.metadata.key());
        info!("Envoy finalized");
        Ok(())
    }

    async fn converge(&self, envoy: &Envoy) -> Result<ServiceOutcome> {
        let envoy = ensure_finalizer(self.ctx.store.as_ref(), envoy).await?;
        let outcome = ensure_service(self.ctx.store.as_ref(), &envoy).await?;
        debug!(?outcome, "Owned service converged");
        Ok(outcome)
    }
}

#[async_trait]
impl Reconciler for EnvoyReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Envoy
    }

    async fn reconcile(&self, key: &NamespacedName) -> Result<()> {
        // Finalizer updates need the latest resource version, so read through.
        let envoy = match self.ctx.store.get(ResourceKind::Envoy, key).await {
            Ok(Resource::Envoy(envoy)) => envoy,
            Ok(other) => return Err(Error::internal(format!("store returned a {} for Envoy {}", other.kind(), key))),
            Err(e) if e.is_not_found() => {
                self.ctx.status.remove(StatusKind::Envoy, key);
                debug!("Envoy is gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if envoy.metadata.is_deleting() {
            return self.finalize(&envoy).await;
        }

        let result = match validate_envoy(&envoy, &self.ctx.cache.snapshot()) {
            Ok(()) => self.converge(&envoy).await,
            Err(e) => Err(e),
        };

        let mut accessor = self.ctx.status.accessor(StatusKind::Envoy, key, envoy.metadata.generation);
        match &result {
            Ok(ServiceOutcome::NotOwned) => {
                let service = service_key(&envoy);
                warn!(%service, "Envoy service name is taken by a service this envoy does not own");
                accessor.stage_condition(
                    CONDITION_AVAILABLE,
                    ConditionStatus::False,
                    REASON_SERVICE_NOT_OWNED,
                    format!("Service {} exists and is not owned by this Envoy", service),
                )
            }
            Ok(_) => accessor.stage_condition(
                CONDITION_AVAILABLE,
                ConditionStatus::True,
                REASON_SERVICE_AVAILABLE,
                "Owned service is up to date",
            ),
            Err(e) => accessor.stage_condition(CONDITION_AVAILABLE, ConditionStatus::False, e.reason(), e.to_string()),
        }
        self.ctx.finish(accessor, result.map(|_| ())).await
    }
}
