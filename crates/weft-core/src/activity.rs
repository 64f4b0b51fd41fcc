//! The `Activity` trait: the contract every unit of work implements.
//!
//! Activities are immutable definitions shared read-only across instances
//! (`Arc<dyn Activity>`); all runtime state lives in the executor's
//! instance arena and in per-instance properties. Every entry point
//! receives an `ActivityContext` scoped to the instance being driven, and
//! returns a `Result` -- an `Err` puts the instance into `Faulting` and
//! starts fault propagation.

use serde_json::Value;

use weft_types::bookmark::Bookmark;
use weft_types::fault::{FaultContext, WorkflowFault};
use weft_types::instance::{CompletionState, InstanceId};

use crate::executor::context::ActivityContext;

/// How a fault delivered to a parent was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDisposition {
    /// The parent took ownership of the fault; propagation stops.
    Handled,
    /// The parent declined; the fault keeps propagating toward the root.
    Unhandled,
}

/// Completion record delivered to the parent's `child_completed` callback.
#[derive(Debug, Clone)]
pub struct ChildCompletion {
    /// Handle of the completed child (already removed from the arena).
    pub instance: InstanceId,
    /// Terminal outcome.
    pub outcome: CompletionState,
    /// Result value the child set via `ActivityContext::set_result`.
    pub result: Option<Value>,
}

/// A delivered bookmark resumption.
#[derive(Debug, Clone)]
pub struct BookmarkResumption {
    /// The bookmark that fired.
    pub bookmark: Bookmark,
    /// The callback discriminant recorded at creation.
    pub kind: u32,
    /// The callback payload recorded at creation.
    pub payload: Option<Value>,
    /// The value supplied by the resumer.
    pub value: Value,
}

/// One composable unit of work.
///
/// Only `execute` is required. The default `cancel` implementation forwards
/// cancellation to all unfinished children and marks the instance canceled;
/// activities that must finish in-flight work (timers, compensation
/// machinery) override it.
pub trait Activity: Send + Sync + 'static {
    /// Name used in logs and engine events.
    fn display_name(&self) -> &str {
        "activity"
    }

    /// Run the activity's own logic. Scheduling children or creating
    /// bookmarks keeps the instance alive after this returns.
    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault>;

    /// A child scheduled with a completion tag reached `Closed` or
    /// `Canceled`.
    fn child_completed(
        &self,
        _ctx: &mut ActivityContext<'_>,
        _child: ChildCompletion,
        _tag: u32,
    ) -> Result<(), WorkflowFault> {
        Ok(())
    }

    /// A child scheduled with a fault tag settled as `Faulted`.
    fn child_faulted(
        &self,
        _ctx: &mut ActivityContext<'_>,
        _fault: &FaultContext,
        _tag: u32,
    ) -> Result<FaultDisposition, WorkflowFault> {
        Ok(FaultDisposition::Unhandled)
    }

    /// A bookmark owned by this instance was resumed.
    fn bookmark_resumed(
        &self,
        _ctx: &mut ActivityContext<'_>,
        _resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        Ok(())
    }

    /// Cancellation was requested for this instance.
    fn cancel(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.cancel_children();
        ctx.mark_canceled()
    }
}
