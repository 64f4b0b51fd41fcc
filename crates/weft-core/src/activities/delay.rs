//! `Delay`: durable wait built on the timer extension.
//!
//! Registers a timer against a fresh bookmark and parks. Because the due
//! instant is absolute wall-clock time in the timer table, a delay that
//! survives a snapshot/restore still fires at the originally scheduled
//! instant.

use chrono::TimeDelta;
use serde_json::Value;

use weft_types::bookmark::{Bookmark, BookmarkOptions};
use weft_types::fault::WorkflowFault;
use weft_types::timer::TimerError;

use crate::activity::{Activity, BookmarkResumption};
use crate::executor::context::ActivityContext;
use crate::timer::DurableTimerExtension;

const KIND_FIRED: u32 = 1;
const PROP_BOOKMARK: &str = "weft.delay.bookmark";

pub struct Delay {
    duration: TimeDelta,
}

impl Delay {
    pub fn new(duration: TimeDelta) -> Self {
        Self { duration }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(TimeDelta::milliseconds(millis))
    }

    pub fn from_secs(secs: i64) -> Self {
        Self::new(TimeDelta::seconds(secs))
    }
}

impl Activity for Delay {
    fn display_name(&self) -> &str {
        "delay"
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        if self.duration < TimeDelta::zero() {
            return Err(WorkflowFault::argument(
                "duration",
                "delay must not be negative",
            ));
        }
        let timer = ctx.get_extension::<DurableTimerExtension>().ok_or_else(|| {
            WorkflowFault::usage("Delay requires the durable timer extension")
        })?;
        let bookmark = ctx.create_bookmark(KIND_FIRED, None, BookmarkOptions::default());
        ctx.set_property(PROP_BOOKMARK, Value::from(bookmark.0));
        if let Err(err) = timer.register_timer(bookmark, self.duration) {
            ctx.remove_bookmark(bookmark);
            return Err(match err {
                TimerError::NegativeDuration { .. } => {
                    WorkflowFault::argument("duration", err.to_string())
                }
                other => WorkflowFault::usage(other.to_string()),
            });
        }
        Ok(())
    }

    fn bookmark_resumed(
        &self,
        _ctx: &mut ActivityContext<'_>,
        resumption: BookmarkResumption,
    ) -> Result<(), WorkflowFault> {
        debug_assert_eq!(resumption.kind, KIND_FIRED);
        Ok(())
    }

    /// Disarm the timer so a canceled delay can never fire later.
    fn cancel(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        if let Some(raw) = ctx.get_property(PROP_BOOKMARK) {
            if let Some(id) = raw.as_u64() {
                let bookmark = Bookmark(id);
                if let Some(timer) = ctx.get_extension::<DurableTimerExtension>() {
                    // SnapshotInProgress here only delays the disarm; the
                    // bookmark removal below makes a late fire a NotFound.
                    let _ = timer.cancel_timer(bookmark);
                }
                ctx.remove_bookmark(bookmark);
            }
        }
        ctx.mark_canceled()
    }
}
