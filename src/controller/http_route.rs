use super::{ControllerContext, Reconciler};
use crate::domain::{ConditionStatus, NamespacedName, Resource, ResourceKind, CONDITION_ADMITTED};
use crate::errors::Result;
use crate::status::StatusKind;
use crate::validation::{route_binding, validate_http_route, RouteBinding};
use async_trait::async_trait;
use tracing::debug;

/// Reason reported when no listener of the selected gateway binds a route
pub const REASON_NOT_BOUND: &str = "NotBound";

/// Reports whether an HTTPRoute can be programmed
#[derive(Debug)]
pub struct HttpRouteReconciler {
    ctx: ControllerContext,
}

impl HttpRouteReconciler {
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for HttpRouteReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HttpRoute
    }

    async fn reconcile(&self, key: &NamespacedName) -> Result<()> {
        let route = match self.ctx.cache.get(ResourceKind::HttpRoute, key) {
            Some(Resource::HttpRoute(route)) => route,
            _ => {
                self.ctx.status.remove(StatusKind::HttpRoute, key);
                debug!("HTTPRoute is gone");
                return Ok(());
            }
        };

        let snapshot = self.ctx.cache.snapshot();
        let verdict = validate_http_route(&route, &snapshot);
        let mut accessor = self.ctx.status.accessor(StatusKind::HttpRoute, key, route.metadata.generation);
        match (&verdict, route_binding(&route, &snapshot)) {
            (Err(e), _) => {
                accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::False, e.reason(), e.to_string())
            }
            // gateway changes requeue the route, so there is nothing to retry here
            (Ok(()), RouteBinding::Unbound(message)) => {
                debug!(%message, "HTTPRoute is not bound");
                accessor.stage_condition(CONDITION_ADMITTED, ConditionStatus::False, REASON_NOT_BOUND, message)
            }
            (Ok(()), RouteBinding::Bound) => accessor.stage_condition(
                CONDITION_ADMITTED,
                ConditionStatus::True,
                "Valid",
                "Valid HTTPRoute",
            ),
        }
        self.ctx.finish(accessor, verdict).await
    }
}
