//! Engine lifecycle events published on the broadcast bus.
//!
//! Hosts subscribe to observe instance progress (dashboards, audit trails,
//! tests asserting ordering) without reaching into executor internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bookmark::Bookmark;
use crate::compensation::{CompensationId, CompensationState};
use crate::instance::{CompletionState, InstanceId};

/// One engine lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A workflow instance began executing its root activity.
    InstanceStarted { workflow_id: Uuid },

    /// The work-list drained and the instance went idle waiting on
    /// bookmarks.
    InstanceIdle { workflow_id: Uuid },

    /// The instance reached a final outcome.
    InstanceCompleted { workflow_id: Uuid, outcome: String },

    /// An activity instance was scheduled.
    ActivityScheduled {
        workflow_id: Uuid,
        instance: InstanceId,
        activity: String,
    },

    /// An activity instance reached a terminal state.
    ActivityCompleted {
        workflow_id: Uuid,
        instance: InstanceId,
        activity: String,
        outcome: CompletionState,
    },

    /// A bookmark was resumed and its callback delivered.
    BookmarkResumed {
        workflow_id: Uuid,
        bookmark: Bookmark,
        owner: InstanceId,
    },

    /// A durable timer fired and resumed its bookmark.
    TimerFired { bookmark: Bookmark },

    /// A durable timer was canceled before firing.
    TimerCanceled { bookmark: Bookmark },

    /// A compensation token moved along its state machine.
    CompensationTransition {
        workflow_id: Uuid,
        token: CompensationId,
        from: CompensationState,
        to: CompensationState,
    },
}
