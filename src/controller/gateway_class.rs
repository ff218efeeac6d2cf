use super::{ControllerContext, Reconciler};
use crate::domain::{ConditionStatus, NamespacedName, Resource, ResourceKind, CONDITION_ADMITTED};
use crate::errors::Result;
use crate::status::StatusKind;
use crate::validation::validate_gateway_class;
use async_trait::async_trait;
use tracing::debug;

/// Admits GatewayClasses naming this controller
#[derive(Debug)]
pub struct GatewayClassReconciler {
    ctx: ControllerContext,
}

impl GatewayClassReconciler {
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for GatewayClassReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::GatewayClass
    }

    async fn reconcile(&self, key: &NamespacedName) -> Result<()> {
        let class = match self.ctx.cache.get(ResourceKind::GatewayClass, key) {
            Some(Resource::GatewayClass(class)) => class,
            _ => {
                self.ctx.status.remove(StatusKind::GatewayClass, key);
                debug!("GatewayClass is gone");
                return Ok(());
            }
        };

        if class.spec.controller != self.ctx.controller_name {
            debug!(controller = %class.spec.controller, "GatewayClass belongs to another controller");
            return Ok(());
        }

        let verdict = validate_gateway_class(&class);
        let mut accessor = self.ctx.status.accessor(StatusKind::GatewayClass, key, class.metadata.generation);
        match &verdict {
            Ok(()) => accessor.stage_condition(
                CONDITION_ADMITTED,
                ConditionStatus::True,
                "Valid",
                "Valid GatewayClass",
            ),
            Err(e) => accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::False, e.reason(), e.to_string()),
        }
        self.ctx.finish(accessor, verdict).await
    }
}
