//! Activity-instance identity, lifecycle states, and workflow outcomes.
//!
//! Activity instances live in an arena owned by the executor and are
//! addressed by `InstanceId` -- a plain index, never a pointer -- so the
//! instance tree stays serializable and free of back-reference cycles.

use serde::{Deserialize, Serialize};

use crate::fault::WorkflowFault;

// ---------------------------------------------------------------------------
// InstanceId
// ---------------------------------------------------------------------------

/// Handle addressing one activity instance inside the executor's arena.
///
/// Ids are allocated monotonically within a workflow instance and are never
/// reused, so a stale handle can only ever miss -- it can never alias a
/// newer instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct InstanceId(pub u32);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle states
// ---------------------------------------------------------------------------

/// Lifecycle state of one activity instance.
///
/// Transitions: `Executing -> {Canceling -> Canceled | Faulting -> Faulted
/// | Closed}`. The three terminal states are delivered to the parent's
/// registered callback exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityInstanceState {
    Executing,
    Canceling,
    Faulting,
    Closed,
    Canceled,
    Faulted,
}

impl ActivityInstanceState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Canceled | Self::Faulted)
    }
}

/// Terminal outcome of one activity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Closed,
    Canceled,
    Faulted,
}

impl std::fmt::Display for CompletionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Canceled => "canceled",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Workflow outcome
// ---------------------------------------------------------------------------

/// Final outcome of a whole workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// Root activity closed normally.
    Completed,
    /// Root activity was canceled.
    Canceled,
    /// An unhandled fault reached the root and the instance aborted.
    Faulted { fault: WorkflowFault },
    /// The host terminated the instance unconditionally, bypassing fault
    /// propagation and compensation.
    Terminated { reason: String },
}

impl WorkflowOutcome {
    /// Short label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Faulted { .. } => "faulted",
            Self::Terminated { .. } => "terminated",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ActivityInstanceState::Closed.is_terminal());
        assert!(ActivityInstanceState::Canceled.is_terminal());
        assert!(ActivityInstanceState::Faulted.is_terminal());
        assert!(!ActivityInstanceState::Executing.is_terminal());
        assert!(!ActivityInstanceState::Canceling.is_terminal());
        assert!(!ActivityInstanceState::Faulting.is_terminal());
    }

    #[test]
    fn instance_id_display() {
        assert_eq!(InstanceId(7).to_string(), "#7");
    }

    #[test]
    fn outcome_roundtrips_through_json() {
        let outcome = WorkflowOutcome::Terminated {
            reason: "operator request".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: WorkflowOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
        assert_eq!(back.label(), "terminated");
    }
}
