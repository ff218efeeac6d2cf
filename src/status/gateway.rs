//! Gateway status sync.

use super::StatusAccessor;
use crate::domain::{ConditionStatus, CONDITION_READY, CONDITION_SCHEDULED};
use crate::errors::Result;

/// Stage the Gateway status for a validation verdict.
///
/// The default `Scheduled` condition is dropped, `Ready` mirrors the
/// verdict and addresses are cleared since none are assigned yet.
pub fn sync_gateway(accessor: &mut StatusAccessor<'_>, verdict: &Result<()>) {
    accessor.remove_condition(CONDITION_SCHEDULED);
    accessor.set_gateway_addresses(Vec::new());

    match verdict {
        Ok(()) => accessor.stage_condition(
            CONDITION_READY,
            ConditionStatus::True,
            "ListenersValid",
            "Valid Gateway",
        ),
        Err(e) => accessor.stage_condition(CONDITION_READY, ConditionStatus::False, e.reason(), e.to_string()),
    }
}
