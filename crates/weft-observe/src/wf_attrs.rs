//! Attribute keys for workflow instrumentation.
//!
//! The engine declares these as span fields (`wf.activity.name = ...`)
//! and fills the deferred ones through `Span::record` once the value is
//! known, so the same keys appear consistently in logs and exported
//! traces.

// --- Instance attributes ---

/// Workflow instance identifier (UUID).
pub const WF_INSTANCE_ID: &str = "wf.instance.id";

/// Final outcome label of a completed instance. Recorded on the host's
/// pump span when the run reaches a terminal state.
pub const WF_INSTANCE_OUTCOME: &str = "wf.instance.outcome";

// --- Dispatch attributes ---

/// Which scheduler operation a dispatch span covers (one of the `OP_*`
/// values).
pub const WF_OP: &str = "wf.op";

/// Arena handle of the activity instance.
pub const WF_ACTIVITY_INSTANCE: &str = "wf.activity.instance";

/// Display name of the activity.
pub const WF_ACTIVITY_NAME: &str = "wf.activity.name";

/// Terminal state of an activity instance settled during the dispatch
/// (closed/canceled/faulted). Recorded when the instance settles.
pub const WF_ACTIVITY_OUTCOME: &str = "wf.activity.outcome";

// --- Bookmark attributes ---

/// Bookmark token.
pub const WF_BOOKMARK: &str = "wf.bookmark";

/// Resume status reported to the caller (success/not_found/not_ready).
/// Recorded on the proxy's resume span once the attempt resolves.
pub const WF_BOOKMARK_STATUS: &str = "wf.bookmark.status";

// --- Compensation attributes ---

/// Compensation token identifier.
pub const WF_COMPENSATION_TOKEN: &str = "wf.compensation.token";

/// Compensation token state after a transition.
pub const WF_COMPENSATION_STATE: &str = "wf.compensation.state";

// --- Fault attributes ---

/// Hierarchical fault code of a propagating fault. Recorded on the
/// dispatch span when the fault is first captured.
pub const WF_FAULT_CODE: &str = "wf.fault.code";

// --- `WF_OP` values ---

/// Activity execution.
pub const OP_EXECUTE: &str = "execute";

/// Bookmark resumption delivery.
pub const OP_RESUME: &str = "resume";

/// Cancellation delivery.
pub const OP_CANCEL: &str = "cancel";
