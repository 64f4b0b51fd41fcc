//! Compensation participant: the parked half of a compensable scope.
//!
//! When a scope's body settles, the scope schedules one participant as a
//! secondary root and hands it the token. The participant parks on three
//! bookmarks (confirm / compensate / cancel); whichever fires first picks
//! the settlement path:
//!
//! 1. transition the token into the corresponding `-ing` state,
//! 2. run a default pass over the token's own tracked children,
//! 3. run the matching user handler (if any),
//! 4. transition to the final state, retire the token, and resume whoever
//!    is waiting on the settlement.

use std::sync::Arc;

use serde_json::Value;

use weft_types::bookmark::BookmarkOptions;
use weft_types::compensation::{CompensationBookmarkRole, CompensationId, CompensationState};
use weft_types::fault::{FaultContext, WorkflowFault};

use crate::activity::{Activity, BookmarkResumption, ChildCompletion, FaultDisposition};
use crate::compensation::{CompensationAction, CompensationExtension};
use crate::executor::context::ActivityContext;

use super::{comp_fault, publish_transition, settlement_value};

const KIND_ON_CONFIRM: u32 = 1;
const KIND_ON_COMPENSATE: u32 = 2;
const KIND_ON_CANCEL: u32 = 3;

const TAG_CHILD_PASS: u32 = 10;
const TAG_HANDLER: u32 = 11;
const TAG_PASS_FAULT: u32 = 12;
const TAG_HANDLER_FAULT: u32 = 13;

const PROP_MODE: &str = "weft.participant.mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Confirm,
    Compensate,
    Cancel,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Confirm => "confirm",
            Mode::Compensate => "compensate",
            Mode::Cancel => "cancel",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "confirm" => Some(Mode::Confirm),
            "compensate" => Some(Mode::Compensate),
            "cancel" => Some(Mode::Cancel),
            _ => None,
        }
    }
}

pub struct CompensationParticipant {
    token: CompensationId,
    confirmation: Option<Arc<dyn Activity>>,
    compensation: Option<Arc<dyn Activity>>,
    cancellation: Option<Arc<dyn Activity>>,
}

impl CompensationParticipant {
    pub fn new(
        token: CompensationId,
        confirmation: Option<Arc<dyn Activity>>,
        compensation: Option<Arc<dyn Activity>>,
        cancellation: Option<Arc<dyn Activity>>,
    ) -> Self {
        Self {
            token,
            confirmation,
            compensation,
            cancellation,
        }
    }

    fn extension(
        &self,
        ctx: &ActivityContext<'_>,
    ) -> Result<Arc<CompensationExtension>, WorkflowFault> {
        ctx.get_extension::<CompensationExtension>()
            .ok_or_else(|| WorkflowFault::usage("compensation extension not registered"))
    }

    fn mode(&self, ctx: &ActivityContext<'_>) -> Result<Mode, WorkflowFault> {
        ctx.get_property(PROP_MODE)
            .as_ref()
            .and_then(Value::as_str)
            .and_then(Mode::from_str)
            .ok_or_else(|| WorkflowFault::internal("participant has no settlement mode"))
    }

    /// A settlement trigger fired: drop the other triggers, transition the
    /// token, and run the default pass over its tracked children.
    fn begin(&self, ctx: &mut ActivityContext<'_>, mode: Mode) -> Result<(), WorkflowFault> {
        let ext = self.extension(ctx)?;
        for role in [
            CompensationBookmarkRole::OnConfirmation,
            CompensationBookmarkRole::OnCompensation,
            CompensationBookmarkRole::OnCancellation,
        ] {
            if let Some(bm) = ext.take_role_bookmark(self.token, role).map_err(comp_fault)? {
                ctx.remove_bookmark(bm);
            }
        }
        let ing = match mode {
            Mode::Confirm => CompensationState::Confirming,
            Mode::Compensate => CompensationState::Compensating,
            Mode::Cancel => CompensationState::Canceling,
        };
        let from = ext.transition(self.token, ing).map_err(comp_fault)?;
        publish_transition(ctx, self.token, from, ing);
        ctx.set_property(PROP_MODE, Value::from(mode.as_str()));

        // Children of a canceling scope are compensated, not confirmed.
        let child_action = match mode {
            Mode::Confirm => CompensationAction::Confirm,
            Mode::Compensate | Mode::Cancel => CompensationAction::Compensate,
        };
        ctx.schedule_activity(
            Arc::new(super::DefaultCompensationPass::new(self.token, child_action)),
            Some(TAG_CHILD_PASS),
            Some(TAG_PASS_FAULT),
        );
        Ok(())
    }

    fn handler_for(&self, mode: Mode) -> Option<Arc<dyn Activity>> {
        match mode {
            Mode::Confirm => self.confirmation.clone(),
            Mode::Compensate => self.compensation.clone(),
            Mode::Cancel => self.cancellation.clone(),
        }
    }

    /// Final transition: retire the token and wake whoever awaits the
    /// settlement (an explicit Confirm/Compensate, a default pass walking
    /// the parent tracker, or the owning scope's cancel path).
    ///
    /// When a settlement handler faulted, the token still reaches its
    /// terminal state and the fault rides the waiter's resumption value;
    /// the waiter rethrows it in its own tree.
    fn finish(
        &self,
        ctx: &mut ActivityContext<'_>,
        handler_fault: Option<WorkflowFault>,
    ) -> Result<(), WorkflowFault> {
        let ext = self.extension(ctx)?;
        let mode = self.mode(ctx)?;
        let (terminal, done_role) = match mode {
            Mode::Confirm => (
                CompensationState::Confirmed,
                CompensationBookmarkRole::Confirmed,
            ),
            Mode::Compensate => (
                CompensationState::Compensated,
                CompensationBookmarkRole::Compensated,
            ),
            Mode::Cancel => (
                CompensationState::Canceled,
                CompensationBookmarkRole::Canceled,
            ),
        };
        let from = ext.transition(self.token, terminal).map_err(comp_fault)?;
        publish_transition(ctx, self.token, from, terminal);
        let bookmarks = ext.settle_token(self.token).map_err(comp_fault)?;
        if let Some(waiter) = bookmarks.get(done_role) {
            ctx.resume_bookmark(waiter, settlement_value(handler_fault.as_ref()));
        }
        Ok(())
    }
}

impl Activity for CompensationParticipant {
    fn display_name(&self) -> &str {
        "compensation-participant"
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        let ext = self.extension(ctx)?;
        for (kind, role) in [
            (KIND_ON_CONFIRM, CompensationBookmarkRole::OnConfirmation),
            (KIND_ON_COMPENSATE, CompensationBookmarkRole::OnCompensation),
            (KIND_ON_CANCEL, CompensationBookmarkRole::OnCancellation),
        ] {
            let bm = ctx.create_bookmark(kind, None, BookmarkOptions::default());
            ext.set_role_bookmark(self.token, role, bm)
                .map_err(comp_fault)?;
        }
        // Tell the owning scope its participant is parked and reachable.
        if let Some(ready) = ext
            .take_role_bookmark(self.token, CompensationBookmarkRole::OnSecondaryRootScheduled)
            .map_err(comp_fault)?
        {
            ctx.resume_bookmark(ready, Value::Null);
        }
        Ok(())
    }

    fn bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        let mode = match resumption.kind {
            KIND_ON_CONFIRM => Mode::Confirm,
            KIND_ON_COMPENSATE => Mode::Compensate,
            KIND_ON_CANCEL => Mode::Cancel,
            other => {
                return Err(WorkflowFault::internal(format!(
                    "participant received unknown bookmark kind {other}"
                )));
            }
        };
        self.begin(ctx, mode)
    }

    fn child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: ChildCompletion,
        tag: u32,
    ) -> Result<(), WorkflowFault> {
        let _ = child;
        match tag {
            TAG_CHILD_PASS => {
                let mode = self.mode(ctx)?;
                match self.handler_for(mode) {
                    Some(handler) => {
                        let id =
                            ctx.schedule_activity(handler, Some(TAG_HANDLER), Some(TAG_HANDLER_FAULT));
                        ctx.shield_child(id);
                        Ok(())
                    }
                    None => self.finish(ctx, None),
                }
            }
            TAG_HANDLER => self.finish(ctx, None),
            other => Err(WorkflowFault::internal(format!(
                "participant received unknown completion tag {other}"
            ))),
        }
    }

    fn child_faulted(
        &self,
        ctx: &mut ActivityContext<'_>,
        fault: &FaultContext,
        tag: u32,
    ) -> Result<FaultDisposition, WorkflowFault> {
        match tag {
            // The fault is consumed here and forwarded to the settlement
            // waiter; the participant itself settles cleanly.
            TAG_PASS_FAULT | TAG_HANDLER_FAULT => {
                self.finish(ctx, Some(fault.fault.clone()))?;
                Ok(FaultDisposition::Handled)
            }
            _ => Ok(FaultDisposition::Unhandled),
        }
    }

    /// Participants ignore cancellation: a settlement already in flight
    /// must reach a terminal token state.
    fn cancel(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        Ok(())
    }
}
