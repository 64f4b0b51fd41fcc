//! Compensable scope: the saga unit of work.
//!
//! Runs its body under a fresh compensation token (nested under the
//! enclosing scope's ambient token, or the virtual root). When the body
//! settles the scope parks a `CompensationParticipant` as a secondary
//! root and closes; the participant holds the token's
//! confirm/compensate/cancel bookmarks until someone settles it.
//!
//! A canceled or faulted body instead routes through the participant's
//! cancellation path (nested tokens compensated, the user's cancellation
//! handler run) before the scope itself settles; a faulted body rethrows
//! its fault afterwards.

use std::sync::Arc;

use serde_json::Value;

use weft_types::bookmark::BookmarkOptions;
use weft_types::compensation::{CompensationBookmarkRole, CompensationId, CompensationState};
use weft_types::fault::{FaultContext, WorkflowFault};

use crate::activity::{Activity, BookmarkResumption, ChildCompletion, FaultDisposition};
use crate::compensation::CompensationExtension;
use crate::executor::context::ActivityContext;

use super::{
    comp_fault, fault_in_value, publish_transition, token_from_value, CompensationParticipant,
    PROP_AMBIENT_TOKEN,
};

const TAG_BODY: u32 = 1;
const TAG_BODY_FAULT: u32 = 2;

const KIND_PARTICIPANT_READY: u32 = 1;
const KIND_CANCEL_SETTLED: u32 = 2;

const PROP_BODY: &str = "weft.scope.body";
const PROP_FAULT: &str = "weft.scope.fault";

pub struct CompensableScope {
    name: String,
    body: Arc<dyn Activity>,
    confirmation: Option<Arc<dyn Activity>>,
    compensation: Option<Arc<dyn Activity>>,
    cancellation: Option<Arc<dyn Activity>>,
}

impl CompensableScope {
    pub fn new(name: impl Into<String>, body: Arc<dyn Activity>) -> Self {
        Self {
            name: name.into(),
            body,
            confirmation: None,
            compensation: None,
            cancellation: None,
        }
    }

    pub fn with_confirmation(mut self, handler: Arc<dyn Activity>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    pub fn with_compensation(mut self, handler: Arc<dyn Activity>) -> Self {
        self.compensation = Some(handler);
        self
    }

    pub fn with_cancellation(mut self, handler: Arc<dyn Activity>) -> Self {
        self.cancellation = Some(handler);
        self
    }

    fn extension(
        &self,
        ctx: &ActivityContext<'_>,
    ) -> Result<Arc<CompensationExtension>, WorkflowFault> {
        ctx.get_extension::<CompensationExtension>()
            .ok_or_else(|| WorkflowFault::usage("compensation extension not registered"))
    }

    fn own_token(&self, ctx: &ActivityContext<'_>) -> Result<CompensationId, WorkflowFault> {
        ctx.get_property(PROP_AMBIENT_TOKEN)
            .as_ref()
            .and_then(token_from_value)
            .ok_or_else(|| WorkflowFault::internal("compensable scope lost its token"))
    }

    fn body_outcome(&self, ctx: &ActivityContext<'_>) -> String {
        ctx.get_property(PROP_BODY)
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or("closed")
            .to_string()
    }

    /// Park the participant for this token as a secondary root. The scope
    /// blocks on the ready bookmark until the participant's trigger
    /// bookmarks are registered.
    fn spawn_participant(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        let ext = self.extension(ctx)?;
        let token = self.own_token(ctx)?;
        let ready = ctx.create_bookmark(KIND_PARTICIPANT_READY, None, BookmarkOptions::default());
        ext.set_role_bookmark(token, CompensationBookmarkRole::OnSecondaryRootScheduled, ready)
            .map_err(comp_fault)?;
        ctx.schedule_secondary_root(Arc::new(CompensationParticipant::new(
            token,
            self.confirmation.clone(),
            self.compensation.clone(),
            self.cancellation.clone(),
        )));
        Ok(())
    }

    /// Drive the parked participant through its cancellation path and
    /// block until the token settles.
    fn begin_cancel_path(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        let ext = self.extension(ctx)?;
        let token = self.own_token(ctx)?;
        let settled = ctx.create_bookmark(KIND_CANCEL_SETTLED, None, BookmarkOptions::default());
        ext.set_role_bookmark(token, CompensationBookmarkRole::Canceled, settled)
            .map_err(comp_fault)?;
        let trigger = ext
            .role_bookmark(token, CompensationBookmarkRole::OnCancellation)
            .map_err(comp_fault)?
            .ok_or_else(|| {
                WorkflowFault::internal("participant has no cancellation bookmark")
            })?;
        ctx.resume_bookmark(trigger, Value::Null);
        Ok(())
    }
}

impl Activity for CompensableScope {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        if ctx.in_secondary_root_subtree() {
            return Err(WorkflowFault::validation(
                "compensable scope cannot run inside a settlement handler",
            ));
        }
        let ext = ctx.get_or_add_extension_with(|| Arc::new(CompensationExtension::new()));
        let parent = ctx
            .get_property(PROP_AMBIENT_TOKEN)
            .as_ref()
            .and_then(token_from_value)
            .unwrap_or(CompensationId::ROOT);
        let token = ext.allocate(parent);
        ctx.set_property(PROP_AMBIENT_TOKEN, Value::from(token.0));
        // Token id surfaces as the scope's result so enclosing activities
        // can wire explicit Confirm/Compensate to it.
        ctx.set_result(Value::from(token.0));
        let from = ext
            .transition(token, CompensationState::Active)
            .map_err(comp_fault)?;
        publish_transition(ctx, token, from, CompensationState::Active);
        ctx.schedule_activity(self.body.clone(), Some(TAG_BODY), Some(TAG_BODY_FAULT));
        Ok(())
    }

    fn child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: ChildCompletion,
        tag: u32,
    ) -> Result<(), WorkflowFault> {
        if tag != TAG_BODY {
            return Err(WorkflowFault::internal(format!(
                "compensable scope received unknown completion tag {tag}"
            )));
        }
        let ext = self.extension(ctx)?;
        let token = self.own_token(ctx)?;
        match child.outcome {
            weft_types::instance::CompletionState::Closed => {
                let from = ext
                    .transition(token, CompensationState::Completed)
                    .map_err(comp_fault)?;
                publish_transition(ctx, token, from, CompensationState::Completed);
                let parent = ext.parent_of(token).map_err(comp_fault)?;
                ext.track_completion(parent, token).map_err(comp_fault)?;
                ctx.set_property(PROP_BODY, Value::from("closed"));
            }
            _ => {
                // Canceled body: the token never reaches Completed and is
                // not tracked for settlement.
                ctx.set_property(PROP_BODY, Value::from("canceled"));
            }
        }
        self.spawn_participant(ctx)
    }

    fn child_faulted(
        &self,
        ctx: &mut ActivityContext<'_>,
        fault: &FaultContext,
        tag: u32,
    ) -> Result<FaultDisposition, WorkflowFault> {
        if tag != TAG_BODY_FAULT {
            return Ok(FaultDisposition::Unhandled);
        }
        // Hold the fault until the cancellation path has run; it is
        // rethrown once the token settles.
        ctx.set_property(PROP_BODY, Value::from("faulted"));
        ctx.set_property(
            PROP_FAULT,
            serde_json::to_value(&fault.fault).unwrap_or(Value::Null),
        );
        self.spawn_participant(ctx)?;
        Ok(FaultDisposition::Handled)
    }

    fn bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        match resumption.kind {
            KIND_PARTICIPANT_READY => {
                let body = self.body_outcome(ctx);
                if body == "closed" && !ctx.is_cancel_requested() {
                    // Scope closes; the participant stays parked awaiting
                    // settlement.
                    return Ok(());
                }
                self.begin_cancel_path(ctx)
            }
            KIND_CANCEL_SETTLED => {
                if let Some(fault) = fault_in_value(&resumption.value) {
                    // The cancellation handler faulted: cancellation is no
                    // longer suppressed, the fault propagates.
                    return Err(fault);
                }
                if self.body_outcome(ctx) == "faulted" {
                    let fault: WorkflowFault = ctx
                        .get_property(PROP_FAULT)
                        .and_then(|v| serde_json::from_value(v).ok())
                        .ok_or_else(|| {
                            WorkflowFault::internal("compensable scope lost its body fault")
                        })?;
                    return Err(fault);
                }
                if ctx.is_cancel_requested() {
                    ctx.mark_canceled()?;
                }
                Ok(())
            }
            other => Err(WorkflowFault::internal(format!(
                "compensable scope received unknown bookmark kind {other}"
            ))),
        }
    }

    /// Cancellation only cancels the body here; the scope itself settles
    /// through the participant's cancellation path.
    fn cancel(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.cancel_children();
        Ok(())
    }
}
