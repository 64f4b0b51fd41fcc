//! Default confirmation/compensation pass.
//!
//! Walks one token's execution tracker strictly front-to-back (most
//! recent completion first) and drives each tracked child through the
//! requested operation, waiting for it to settle before touching the
//! next. That sequential front-to-back walk is the saga guarantee:
//! settlement in reverse completion order.

use serde_json::Value;

use weft_types::bookmark::{BookmarkOptions, BookmarkResumeStatus};
use weft_types::compensation::{CompensationBookmarkRole, CompensationId};
use weft_types::fault::WorkflowFault;

use crate::activity::{Activity, BookmarkResumption};
use crate::compensation::{CompensationAction, CompensationExtension};
use crate::executor::context::ActivityContext;

use super::{comp_fault, fault_in_value};

const KIND_CHILD_SETTLED: u32 = 1;

/// Sequentially confirm or compensate everything tracked under `target`.
///
/// Scheduled by the compensation extension at root settlement (target =
/// virtual root) and by participants settling their own children.
pub struct DefaultCompensationPass {
    target: CompensationId,
    action: CompensationAction,
}

impl DefaultCompensationPass {
    pub fn new(target: CompensationId, action: CompensationAction) -> Self {
        Self { target, action }
    }

    /// Start the next tracked child, or finish when the tracker is empty.
    ///
    /// Children without a live trigger bookmark (already settled through
    /// an explicit Confirm/Compensate racing with us) are untracked and
    /// skipped.
    fn step(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        let ext = ctx
            .get_extension::<CompensationExtension>()
            .ok_or_else(|| WorkflowFault::usage("compensation extension not registered"))?;
        let (trigger_role, done_role) = match self.action {
            CompensationAction::Confirm => (
                CompensationBookmarkRole::OnConfirmation,
                CompensationBookmarkRole::Confirmed,
            ),
            CompensationAction::Compensate => (
                CompensationBookmarkRole::OnCompensation,
                CompensationBookmarkRole::Compensated,
            ),
        };
        loop {
            let Some(child) = ext.first_tracked(self.target).map_err(comp_fault)? else {
                // Tracker drained; the pass closes.
                return Ok(());
            };
            let Some(trigger) = ext.role_bookmark(child, trigger_role).map_err(comp_fault)?
            else {
                ext.untrack(self.target, child).map_err(comp_fault)?;
                continue;
            };
            let waiter = ctx.create_bookmark(KIND_CHILD_SETTLED, None, BookmarkOptions::default());
            ext.set_role_bookmark(child, done_role, waiter)
                .map_err(comp_fault)?;
            if ctx.resume_bookmark(trigger, Value::Null) == BookmarkResumeStatus::Success {
                // Parked until the child's participant settles and resumes
                // the waiter.
                return Ok(());
            }
            ctx.remove_bookmark(waiter);
            ext.untrack(self.target, child).map_err(comp_fault)?;
        }
    }
}

impl Activity for DefaultCompensationPass {
    fn display_name(&self) -> &str {
        match self.action {
            CompensationAction::Confirm => "confirmation-pass",
            CompensationAction::Compensate => "compensation-pass",
        }
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        self.step(ctx)
    }

    fn bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        debug_assert_eq!(resumption.kind, KIND_CHILD_SETTLED);
        // A fault in the child's settlement handler rides the resumption
        // value; rethrow it instead of continuing the walk.
        if let Some(fault) = fault_in_value(&resumption.value) {
            return Err(fault);
        }
        self.step(ctx)
    }

    /// The pass must not be interrupted mid-walk; already-issued
    /// settlements have to land somewhere deterministic.
    fn cancel(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        Ok(())
    }
}
