//! # Structured Logging
//!
//! Span macros shared by the reconcile and rebuild paths, so every log line
//! emitted inside them carries the object or cycle it belongs to.

/// Create a tracing span for one reconcile of one object
///
/// ```rust,ignore
/// let span = reconcile_span!("Gateway", key);
/// ```
#[macro_export]
macro_rules! reconcile_span {
    ($kind:expr, $key:expr) => {
        tracing::info_span!(
            "reconcile",
            kind = %$kind,
            namespace = %$key.namespace,
            name = %$key.name,
            reconcile_id = %uuid::Uuid::new_v4()
        )
    };
    ($kind:expr, $key:expr, $($field:tt)*) => {
        tracing::info_span!(
            "reconcile",
            kind = %$kind,
            namespace = %$key.namespace,
            name = %$key.name,
            reconcile_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a DAG rebuild cycle
#[macro_export]
macro_rules! rebuild_span {
    ($pending:expr) => {
        tracing::info_span!("dag_rebuild", pending = $pending, rebuild_id = %uuid::Uuid::new_v4())
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        controller_name = %config.controller.controller_name,
        gateway = %format!("{}/{}", config.controller.gateway_namespace, config.controller.gateway_name),
        holdoff_delay_ms = config.scheduler.holdoff_delay_ms,
        holdoff_max_delay_ms = config.scheduler.holdoff_max_delay_ms,
        metrics_enabled = config.observability.enable_metrics,
        "Meridian control plane configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NamespacedName;

    #[test]
    fn test_span_macros() {
        let key = NamespacedName::new("projectcontour", "contour");
        let span = reconcile_span!("Gateway", key);
        let _enter = span.enter();

        let span = reconcile_span!("Gateway", key, generation = 3);
        let _enter = span.enter();

        let span = rebuild_span!(4u64);
        let _enter = span.enter();
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&crate::config::AppConfig::default());
    }
}
