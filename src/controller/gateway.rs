use super::{ControllerContext, Reconciler};
use crate::domain::{NamespacedName, Resource, ResourceKind};
use crate::errors::Result;
use crate::status::{sync_gateway, StatusKind};
use crate::validation::validate_gateway;
use async_trait::async_trait;
use tracing::debug;

/// Validates Gateways of owned classes and reports `Ready`
#[derive(Debug)]
pub struct GatewayReconciler {
    ctx: ControllerContext,
}

impl GatewayReconciler {
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for GatewayReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Gateway
    }

    async fn reconcile(&self, key: &NamespacedName) -> Result<()> {
        let gateway = match self.ctx.cache.get(ResourceKind::Gateway, key) {
            Some(Resource::Gateway(gateway)) => gateway,
            _ => {
                self.ctx.status.remove(StatusKind::Gateway, key);
                debug!("Gateway is gone");
                return Ok(());
            }
        };

        let cache = self.ctx.cache.snapshot();
        let owned_class = cache
            .gateway_class(&gateway.spec.gateway_class_name)
            .is_some_and(|class| class.spec.controller == self.ctx.controller_name);
        let selected = cache.gateway().is_some_and(|gw| gw.metadata.key() == *key);
        if !owned_class && !selected {
            debug!(class = %gateway.spec.gateway_class_name, "Gateway is not ours");
            return Ok(());
        }

        let verdict = validate_gateway(&gateway, &cache);
        let mut accessor = self.ctx.status.accessor(StatusKind::Gateway, key, gateway.metadata.generation);
        sync_gateway(&mut accessor, &verdict);
        self.ctx.finish(accessor, verdict).await
    }
}
