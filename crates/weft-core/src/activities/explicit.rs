//! Explicit `Confirm` and `Compensate` activities.
//!
//! Settle one compensation token by hand instead of waiting for the
//! automatic pass at root settlement. The token is found through a
//! property key, wired by whoever captured the scope's result. There is
//! no tokenless form: before a scope's body completes its token is not
//! claimable, and after it completes the scope schedules nothing further,
//! so only an activity outside the scope can ever hold a settlable token.
//!
//! Claims are one-shot per operation: a second Confirm of the same token
//! is a silent no-op, while a Confirm after a Compensate (or vice versa)
//! faults.

use serde_json::Value;

use weft_types::bookmark::{BookmarkOptions, BookmarkResumeStatus};
use weft_types::compensation::{CompensationBookmarkRole, CompensationId};
use weft_types::fault::WorkflowFault;

use crate::activity::{Activity, BookmarkResumption};
use crate::compensation::{ClaimOutcome, CompensationAction, CompensationExtension};
use crate::executor::context::ActivityContext;

use super::{comp_fault, fault_in_value, token_from_value};

const KIND_SETTLED: u32 = 1;

/// Explicitly confirm a compensation token.
pub struct Confirm {
    target: String,
}

impl Confirm {
    /// Confirm the token stored under a property key.
    pub fn target(key: impl Into<String>) -> Self {
        Self { target: key.into() }
    }
}

impl Activity for Confirm {
    fn display_name(&self) -> &str {
        "confirm"
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        settle(ctx, &self.target, CompensationAction::Confirm)
    }

    fn bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        settled(ctx, resumption)
    }
}

/// Explicitly compensate a compensation token.
pub struct Compensate {
    target: String,
}

impl Compensate {
    /// Compensate the token stored under a property key.
    pub fn target(key: impl Into<String>) -> Self {
        Self { target: key.into() }
    }
}

impl Activity for Compensate {
    fn display_name(&self) -> &str {
        "compensate"
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        settle(ctx, &self.target, CompensationAction::Compensate)
    }

    fn bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        settled(ctx, resumption)
    }
}

fn resolve_token(
    ctx: &ActivityContext<'_>,
    target: &str,
) -> Result<CompensationId, WorkflowFault> {
    ctx.get_property(target)
        .as_ref()
        .and_then(token_from_value)
        .ok_or_else(|| {
            WorkflowFault::compensation_usage(format!("no compensation token under '{target}'"))
        })
}

fn settle(
    ctx: &mut ActivityContext<'_>,
    target: &str,
    action: CompensationAction,
) -> Result<(), WorkflowFault> {
    let ext = ctx
        .get_extension::<CompensationExtension>()
        .ok_or_else(|| WorkflowFault::compensation_usage("no compensable scope has run"))?;
    let token = resolve_token(ctx, target)?;
    let (claim, trigger_role, done_role) = match action {
        CompensationAction::Confirm => (
            ext.claim_confirm(token),
            CompensationBookmarkRole::OnConfirmation,
            CompensationBookmarkRole::Confirmed,
        ),
        CompensationAction::Compensate => (
            ext.claim_compensate(token),
            CompensationBookmarkRole::OnCompensation,
            CompensationBookmarkRole::Compensated,
        ),
    };
    match claim.map_err(comp_fault)? {
        ClaimOutcome::AlreadyCalled => {
            // Repeat of the same operation: silent no-op.
            tracing::debug!(%token, ?action, "settlement already claimed, skipping");
            Ok(())
        }
        ClaimOutcome::Claimed => {
            let trigger = ext
                .role_bookmark(token, trigger_role)
                .map_err(comp_fault)?
                .ok_or_else(|| {
                    WorkflowFault::compensation_usage(format!(
                        "token {token} has no parked participant"
                    ))
                })?;
            let waiter = ctx.create_bookmark(KIND_SETTLED, None, BookmarkOptions::default());
            ext.set_role_bookmark(token, done_role, waiter)
                .map_err(comp_fault)?;
            match ctx.resume_bookmark(trigger, Value::Null) {
                BookmarkResumeStatus::Success => Ok(()),
                _ => {
                    ctx.remove_bookmark(waiter);
                    Err(WorkflowFault::compensation_usage(format!(
                        "token {token} participant is not resumable"
                    )))
                }
            }
        }
    }
}

fn settled(
    ctx: &mut ActivityContext<'_>,
    resumption: BookmarkResumption,
) -> Result<(), WorkflowFault> {
    let _ = ctx;
    debug_assert_eq!(resumption.kind, KIND_SETTLED);
    // A fault in the settlement handler surfaces here.
    match fault_in_value(&resumption.value) {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}
