//! Compensation (saga) token data: identity, state machine, bookmark table,
//! and the LIFO execution tracker.
//!
//! Each compensable unit of work is tracked by one `CompensationTokenData`
//! keyed by a process-unique `CompensationId`. `parent_compensation_id`
//! mirrors the activity-tree nesting; id 0 is the virtual root under which
//! top-level units register.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::bookmark::Bookmark;

// ---------------------------------------------------------------------------
// CompensationId
// ---------------------------------------------------------------------------

/// Process-unique identity of one compensable unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CompensationId(pub u64);

impl CompensationId {
    /// The virtual root: parent of all top-level compensable units.
    pub const ROOT: CompensationId = CompensationId(0);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl std::fmt::Display for CompensationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compensation-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CompensationState
// ---------------------------------------------------------------------------

/// State machine of one compensable unit.
///
/// `Creating -> Active -> Completed -> {Confirming -> Confirmed |
/// Compensating -> Compensated}`, or `-> Canceling -> Canceled` when the
/// unit's own body canceled or faulted. No transition repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationState {
    Creating,
    Active,
    Completed,
    Confirming,
    Confirmed,
    Compensating,
    Compensated,
    Canceling,
    Canceled,
}

impl CompensationState {
    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(&self, next: CompensationState) -> bool {
        use CompensationState::*;
        matches!(
            (*self, next),
            (Creating, Active)
                | (Active, Completed)
                | (Completed, Confirming)
                | (Confirming, Confirmed)
                | (Completed, Compensating)
                | (Compensating, Compensated)
                | (Active, Canceling)
                | (Completed, Canceling)
                | (Canceling, Canceled)
        )
    }
}

impl std::fmt::Display for CompensationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
            Self::Canceling => "canceling",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Bookmark roles
// ---------------------------------------------------------------------------

/// Roles a bookmark can play in a compensation token's bookmark table.
///
/// The `On*` roles trigger the matching operation on the parked
/// participant; `Confirmed`/`Compensated`/`Canceled` notify the waiter that
/// the operation finished; `OnSecondaryRootScheduled` tells the owning
/// scope that the participant's bookmarks are in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationBookmarkRole {
    OnConfirmation,
    OnCompensation,
    OnCancellation,
    Confirmed,
    Compensated,
    Canceled,
    OnSecondaryRootScheduled,
}

/// Role-indexed table of the live bookmarks belonging to one token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkTable {
    entries: HashMap<CompensationBookmarkRole, Bookmark>,
}

impl BookmarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: CompensationBookmarkRole, bookmark: Bookmark) {
        self.entries.insert(role, bookmark);
    }

    pub fn get(&self, role: CompensationBookmarkRole) -> Option<Bookmark> {
        self.entries.get(&role).copied()
    }

    pub fn remove(&mut self, role: CompensationBookmarkRole) -> Option<Bookmark> {
        self.entries.remove(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CompensationTokenData
// ---------------------------------------------------------------------------

/// Tracked state of one compensable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationTokenData {
    /// This unit's identity.
    pub compensation_id: CompensationId,
    /// Identity of the enclosing unit (`CompensationId::ROOT` at top level).
    pub parent_compensation_id: CompensationId,
    /// Current state-machine position.
    pub state: CompensationState,
    /// Live bookmarks by role.
    pub bookmark_table: BookmarkTable,
    /// Child units that completed under this one, most recent first.
    ///
    /// Default confirm/compensate passes walk this strictly front-to-back,
    /// which is the saga's compensate-in-reverse-completion-order guarantee.
    pub execution_tracker: VecDeque<CompensationId>,
    /// One-shot guard: an explicit Confirm has claimed this token.
    pub confirm_called: bool,
    /// One-shot guard: an explicit Compensate has claimed this token.
    pub compensate_called: bool,
}

impl CompensationTokenData {
    /// Fresh token in state `Creating` under the given parent.
    pub fn new(compensation_id: CompensationId, parent: CompensationId) -> Self {
        Self {
            compensation_id,
            parent_compensation_id: parent,
            state: CompensationState::Creating,
            bookmark_table: BookmarkTable::new(),
            execution_tracker: VecDeque::new(),
            confirm_called: false,
            compensate_called: false,
        }
    }

    /// The virtual root token, immediately `Active`.
    pub fn virtual_root() -> Self {
        let mut token = Self::new(CompensationId::ROOT, CompensationId::ROOT);
        token.state = CompensationState::Active;
        token
    }

    /// Guarded state transition; rejects any edge outside the machine.
    pub fn transition_to(
        &mut self,
        next: CompensationState,
    ) -> Result<(), CompensationError> {
        if !self.state.can_transition_to(next) {
            return Err(CompensationError::IllegalTransition {
                id: self.compensation_id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a child unit's completion (front = most recent).
    pub fn track_child(&mut self, child: CompensationId) {
        self.execution_tracker.push_front(child);
    }

    /// Drop a child from the tracker once it confirmed/compensated/canceled.
    pub fn untrack_child(&mut self, child: CompensationId) {
        self.execution_tracker.retain(|c| *c != child);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the compensation protocol's bookkeeping.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompensationError {
    /// Transition outside the token state machine.
    #[error("compensation token {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: CompensationId,
        from: CompensationState,
        to: CompensationState,
    },

    /// Token id not present in the extension table.
    #[error("unknown compensation token: {0}")]
    UnknownToken(CompensationId),

    /// Confirm/Compensate on a token that already took the other path.
    #[error("compensation token {0} already confirmed or compensated")]
    AlreadySettled(CompensationId),

    /// Confirm/Compensate on a token whose body has not completed.
    #[error("compensation token {id} is {state}, not completed")]
    NotCompleted {
        id: CompensationId,
        state: CompensationState,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut token = CompensationTokenData::new(CompensationId(1), CompensationId::ROOT);
        token.transition_to(CompensationState::Active).unwrap();
        token.transition_to(CompensationState::Completed).unwrap();
        token.transition_to(CompensationState::Confirming).unwrap();
        token.transition_to(CompensationState::Confirmed).unwrap();
    }

    #[test]
    fn cancel_path_from_active_and_completed() {
        let mut a = CompensationTokenData::new(CompensationId(1), CompensationId::ROOT);
        a.transition_to(CompensationState::Active).unwrap();
        a.transition_to(CompensationState::Canceling).unwrap();
        a.transition_to(CompensationState::Canceled).unwrap();

        let mut b = CompensationTokenData::new(CompensationId(2), CompensationId::ROOT);
        b.transition_to(CompensationState::Active).unwrap();
        b.transition_to(CompensationState::Completed).unwrap();
        b.transition_to(CompensationState::Canceling).unwrap();
        b.transition_to(CompensationState::Canceled).unwrap();
    }

    #[test]
    fn confirmed_token_rejects_compensating() {
        let mut token = CompensationTokenData::new(CompensationId(1), CompensationId::ROOT);
        token.transition_to(CompensationState::Active).unwrap();
        token.transition_to(CompensationState::Completed).unwrap();
        token.transition_to(CompensationState::Confirming).unwrap();
        token.transition_to(CompensationState::Confirmed).unwrap();

        let err = token
            .transition_to(CompensationState::Compensating)
            .unwrap_err();
        assert!(matches!(err, CompensationError::IllegalTransition { .. }));
    }

    #[test]
    fn tracker_is_most_recent_first() {
        let mut token = CompensationTokenData::virtual_root();
        token.track_child(CompensationId(1));
        token.track_child(CompensationId(2));
        token.track_child(CompensationId(3));
        let order: Vec<_> = token.execution_tracker.iter().copied().collect();
        assert_eq!(
            order,
            vec![CompensationId(3), CompensationId(2), CompensationId(1)]
        );

        token.untrack_child(CompensationId(2));
        let order: Vec<_> = token.execution_tracker.iter().copied().collect();
        assert_eq!(order, vec![CompensationId(3), CompensationId(1)]);
    }

    #[test]
    fn token_roundtrips_through_json() {
        let mut token = CompensationTokenData::new(CompensationId(5), CompensationId(2));
        token
            .bookmark_table
            .insert(CompensationBookmarkRole::OnConfirmation, Bookmark(9));
        token.track_child(CompensationId(6));
        let json = serde_json::to_string(&token).unwrap();
        let back: CompensationTokenData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}
