//! Structured fault handling: `TryCatch`.
//!
//! Runs a body; when the body faults, handler selection runs over the
//! declared catches: a catch whose code equals the fault code wins
//! outright, otherwise the first *registered* catch whose code is an
//! ancestor of the fault code wins. Declaration order decides ties, not
//! specificity.
//!
//! A `finally` activity runs after the body or the handler on every path,
//! including the no-matching-catch path; the unhandled fault is rethrown
//! once the finally completes. A faulting handler replaces the original
//! fault, and the finally still runs before it propagates.

use std::sync::Arc;

use serde_json::Value;

use weft_types::fault::{FaultCode, FaultContext, WorkflowFault};

use crate::activity::{Activity, ChildCompletion, FaultDisposition};
use crate::executor::context::ActivityContext;

const TAG_BODY: u32 = 1;
const TAG_BODY_FAULT: u32 = 2;
const TAG_HANDLER: u32 = 3;
const TAG_HANDLER_FAULT: u32 = 4;
const TAG_FINALLY: u32 = 5;

const PROP_RETHROW: &str = "weft.trycatch.rethrow";

/// One declared catch clause.
pub struct Catch {
    code: FaultCode,
    handler: Arc<dyn Activity>,
}

impl Catch {
    pub fn new(code: impl Into<FaultCode>, handler: Arc<dyn Activity>) -> Self {
        Self {
            code: code.into(),
            handler,
        }
    }
}

pub struct TryCatch {
    name: String,
    body: Arc<dyn Activity>,
    catches: Vec<Catch>,
    finally: Option<Arc<dyn Activity>>,
}

impl TryCatch {
    pub fn new(name: impl Into<String>, body: Arc<dyn Activity>) -> Self {
        Self {
            name: name.into(),
            body,
            catches: Vec::new(),
            finally: None,
        }
    }

    /// Declare a catch. Order matters: the first assignable catch wins
    /// when no exact match exists.
    pub fn catch(mut self, code: impl Into<FaultCode>, handler: Arc<dyn Activity>) -> Self {
        self.catches.push(Catch::new(code, handler));
        self
    }

    pub fn with_finally(mut self, finally: Arc<dyn Activity>) -> Self {
        self.finally = Some(finally);
        self
    }

    /// Exact code match first, then first-registered assignable catch.
    fn select_catch(&self, code: &FaultCode) -> Option<&Catch> {
        self.catches
            .iter()
            .find(|c| c.code == *code)
            .or_else(|| self.catches.iter().find(|c| c.code.is_assignable_from(code)))
    }

    /// Run the finally (shielded from blanket cancellation), or settle
    /// straight away when there is none.
    fn start_finally(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        match &self.finally {
            Some(finally) => {
                let id = ctx.schedule_activity(finally.clone(), Some(TAG_FINALLY), None);
                ctx.shield_child(id);
                Ok(())
            }
            None => self.finish(ctx),
        }
    }

    /// Rethrow the deferred fault if one is pending, otherwise settle
    /// (acknowledging a pending cancel).
    fn finish(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        if let Some(raw) = ctx.get_property(PROP_RETHROW) {
            let fault: WorkflowFault = serde_json::from_value(raw)
                .map_err(|e| WorkflowFault::internal(format!("lost deferred fault: {e}")))?;
            return Err(fault);
        }
        if ctx.is_cancel_requested() {
            ctx.mark_canceled()?;
        }
        Ok(())
    }

    fn defer_rethrow(&self, ctx: &mut ActivityContext<'_>, fault: &WorkflowFault) {
        ctx.set_property(
            PROP_RETHROW,
            serde_json::to_value(fault).unwrap_or(Value::Null),
        );
    }
}

impl Activity for TryCatch {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.schedule_activity(self.body.clone(), Some(TAG_BODY), Some(TAG_BODY_FAULT));
        Ok(())
    }

    fn child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        _child: ChildCompletion,
        tag: u32,
    ) -> Result<(), WorkflowFault> {
        match tag {
            // A canceled body still runs the finally before settling.
            TAG_BODY | TAG_HANDLER => self.start_finally(ctx),
            TAG_FINALLY => self.finish(ctx),
            other => Err(WorkflowFault::internal(format!(
                "try/catch received unknown completion tag {other}"
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
            TAG_BODY_FAULT => {
                match self.select_catch(&fault.fault.code) {
                    Some(catch) => {
                        tracing::debug!(
                            code = %fault.fault.code,
                            catch = %catch.code,
                            "fault caught"
                        );
                        let arg =
                            serde_json::to_value(&fault.fault).unwrap_or(Value::Null);
                        let id = ctx.schedule_action(
                            catch.handler.clone(),
                            arg,
                            TAG_HANDLER,
                            Some(TAG_HANDLER_FAULT),
                        );
                        ctx.shield_child(id);
                    }
                    None => {
                        // No catch: rethrow after the finally.
                        self.defer_rethrow(ctx, &fault.fault);
                        self.start_finally(ctx)?;
                    }
                }
                Ok(FaultDisposition::Handled)
            }
            TAG_HANDLER_FAULT => {
                // The handler's fault replaces the original.
                self.defer_rethrow(ctx, &fault.fault);
                self.start_finally(ctx)?;
                Ok(FaultDisposition::Handled)
            }
            _ => Ok(FaultDisposition::Unhandled),
        }
    }

    /// During body execution cancel normally; once a handler or finally is
    /// running, cancellation is suppressed until it finishes.
    fn cancel(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.cancel_children();
        Ok(())
    }
}
