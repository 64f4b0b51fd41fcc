//! Built-in machinery activities.
//!
//! These are ordinary `Activity` implementations, with no private access
//! to the executor: everything they do goes through `ActivityContext`
//! and the extension table, the same surface user activities get.

pub mod compensable;
pub mod delay;
pub mod explicit;
pub mod participant;
pub mod pass;
pub mod try_catch;

pub use compensable::CompensableScope;
pub use delay::Delay;
pub use explicit::{Compensate, Confirm};
pub use participant::CompensationParticipant;
pub use pass::DefaultCompensationPass;
pub use try_catch::{Catch, TryCatch};

use weft_types::compensation::{CompensationError, CompensationId, CompensationState};
use weft_types::event::EngineEvent;
use weft_types::fault::WorkflowFault;

use crate::executor::context::ActivityContext;

/// Ambient property carrying the enclosing compensable scope's token id.
pub const PROP_AMBIENT_TOKEN: &str = "weft.compensation.token";

/// Map a bookkeeping error onto a catchable compensation-usage fault.
pub(crate) fn comp_fault(err: CompensationError) -> WorkflowFault {
    WorkflowFault::compensation_usage(err.to_string())
}

pub(crate) fn publish_transition(
    ctx: &ActivityContext<'_>,
    token: CompensationId,
    from: CompensationState,
    to: CompensationState,
) {
    ctx.publish(EngineEvent::CompensationTransition {
        workflow_id: ctx.workflow_id(),
        token,
        from,
        to,
    });
}

/// Read a token id out of a JSON property value.
pub(crate) fn token_from_value(value: &serde_json::Value) -> Option<CompensationId> {
    value.as_u64().map(CompensationId)
}

/// Value delivered when a settlement finishes: `null` on success, a
/// wrapped fault when a settlement handler faulted. Waiters rethrow it.
pub(crate) fn settlement_value(fault: Option<&WorkflowFault>) -> serde_json::Value {
    match fault {
        Some(fault) => serde_json::json!({ "fault": fault }),
        None => serde_json::Value::Null,
    }
}

pub(crate) fn fault_in_value(value: &serde_json::Value) -> Option<WorkflowFault> {
    value
        .get("fault")
        .and_then(|f| serde_json::from_value(f.clone()).ok())
}
