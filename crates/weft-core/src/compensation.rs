//! Compensation extension: the per-instance saga token table.
//!
//! Owns every `CompensationTokenData` in the workflow, keyed by
//! `CompensationId`. All protocol activities (compensable scope,
//! participant, explicit Confirm/Compensate, default passes) go through
//! this table; the tokens themselves are plain data from `weft-types`.
//!
//! When the root activity settles the extension runs the automatic pass:
//! a closed root confirms every outstanding top-level token, a canceled
//! root compensates them, and a faulted root leaves them alone. Passes
//! walk each tracker front-to-back, i.e. reverse completion order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use weft_types::bookmark::Bookmark;
use weft_types::compensation::{
    CompensationBookmarkRole, CompensationError, CompensationId, CompensationState,
    CompensationTokenData,
};
use weft_types::instance::CompletionState;

use crate::activities::pass::DefaultCompensationPass;
use crate::activity::Activity;
use crate::extension::{PersistenceError, PersistenceParticipant, WorkflowExtension};

/// Persisted-value key for the token table.
pub const KEY_TOKEN_TABLE: &str = "weft.compensation/table";
/// Persisted-value key for the id allocator watermark.
pub const KEY_NEXT_ID: &str = "weft.compensation/next_id";

/// Which settlement operation a pass or claim drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationAction {
    Confirm,
    Compensate,
}

/// Outcome of an explicit Confirm/Compensate claim on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First claim; the caller drives the operation.
    Claimed,
    /// The same operation already claimed this token; silent no-op.
    AlreadyCalled,
}

#[derive(Debug)]
struct TokenTable {
    next_id: u64,
    tokens: HashMap<CompensationId, CompensationTokenData>,
}

impl TokenTable {
    fn new() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(CompensationId::ROOT, CompensationTokenData::virtual_root());
        Self { next_id: 1, tokens }
    }

    fn token(&self, id: CompensationId) -> Result<&CompensationTokenData, CompensationError> {
        self.tokens.get(&id).ok_or(CompensationError::UnknownToken(id))
    }

    fn token_mut(
        &mut self,
        id: CompensationId,
    ) -> Result<&mut CompensationTokenData, CompensationError> {
        self.tokens
            .get_mut(&id)
            .ok_or(CompensationError::UnknownToken(id))
    }
}

// ---------------------------------------------------------------------------
// CompensationExtension
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CompensationExtension {
    inner: Mutex<TokenTable>,
}

impl Default for CompensationExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl CompensationExtension {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TokenTable::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenTable> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocate a fresh token in state `Creating` under `parent`.
    pub fn allocate(&self, parent: CompensationId) -> CompensationId {
        let mut table = self.lock();
        let id = CompensationId(table.next_id);
        table.next_id += 1;
        table.tokens.insert(id, CompensationTokenData::new(id, parent));
        tracing::debug!(wf.compensation.token = %id, parent = %parent, "compensation token allocated");
        id
    }

    /// Guarded transition; returns the prior state for event publication.
    pub fn transition(
        &self,
        id: CompensationId,
        to: CompensationState,
    ) -> Result<CompensationState, CompensationError> {
        let mut table = self.lock();
        let token = table.token_mut(id)?;
        let from = token.state;
        token.transition_to(to)?;
        tracing::debug!(wf.compensation.token = %id, wf.compensation.state = %to, %from, "compensation token transition");
        Ok(from)
    }

    pub fn state_of(&self, id: CompensationId) -> Result<CompensationState, CompensationError> {
        Ok(self.lock().token(id)?.state)
    }

    pub fn parent_of(&self, id: CompensationId) -> Result<CompensationId, CompensationError> {
        Ok(self.lock().token(id)?.parent_compensation_id)
    }

    /// Record that `child` completed under `parent` (front of the tracker).
    pub fn track_completion(
        &self,
        parent: CompensationId,
        child: CompensationId,
    ) -> Result<(), CompensationError> {
        self.lock().token_mut(parent)?.track_child(child);
        Ok(())
    }

    /// Most recently completed child still tracked under `parent`.
    pub fn first_tracked(
        &self,
        parent: CompensationId,
    ) -> Result<Option<CompensationId>, CompensationError> {
        Ok(self.lock().token(parent)?.execution_tracker.front().copied())
    }

    pub fn untrack(
        &self,
        parent: CompensationId,
        child: CompensationId,
    ) -> Result<(), CompensationError> {
        self.lock().token_mut(parent)?.untrack_child(child);
        Ok(())
    }

    pub fn set_role_bookmark(
        &self,
        id: CompensationId,
        role: CompensationBookmarkRole,
        bookmark: Bookmark,
    ) -> Result<(), CompensationError> {
        self.lock().token_mut(id)?.bookmark_table.insert(role, bookmark);
        Ok(())
    }

    pub fn role_bookmark(
        &self,
        id: CompensationId,
        role: CompensationBookmarkRole,
    ) -> Result<Option<Bookmark>, CompensationError> {
        Ok(self.lock().token(id)?.bookmark_table.get(role))
    }

    pub fn take_role_bookmark(
        &self,
        id: CompensationId,
        role: CompensationBookmarkRole,
    ) -> Result<Option<Bookmark>, CompensationError> {
        Ok(self.lock().token_mut(id)?.bookmark_table.remove(role))
    }

    /// Retire a settled token: drop it from its parent's tracker and take
    /// its bookmark table. The entry itself stays in the table so later
    /// claims still see the terminal state and claim flags.
    pub fn settle_token(
        &self,
        id: CompensationId,
    ) -> Result<weft_types::compensation::BookmarkTable, CompensationError> {
        let mut table = self.lock();
        let parent = table.token(id)?.parent_compensation_id;
        if let Ok(parent) = table.token_mut(parent) {
            parent.untrack_child(id);
        }
        let token = table.token_mut(id)?;
        Ok(std::mem::take(&mut token.bookmark_table))
    }

    /// Claim a token for an explicit Confirm.
    pub fn claim_confirm(&self, id: CompensationId) -> Result<ClaimOutcome, CompensationError> {
        self.claim(id, CompensationAction::Confirm)
    }

    /// Claim a token for an explicit Compensate.
    pub fn claim_compensate(&self, id: CompensationId) -> Result<ClaimOutcome, CompensationError> {
        self.claim(id, CompensationAction::Compensate)
    }

    fn claim(
        &self,
        id: CompensationId,
        action: CompensationAction,
    ) -> Result<ClaimOutcome, CompensationError> {
        let mut table = self.lock();
        let token = table.token_mut(id)?;
        let (mine, other) = match action {
            CompensationAction::Confirm => (token.confirm_called, token.compensate_called),
            CompensationAction::Compensate => (token.compensate_called, token.confirm_called),
        };
        if mine {
            return Ok(ClaimOutcome::AlreadyCalled);
        }
        if other {
            return Err(CompensationError::AlreadySettled(id));
        }
        match token.state {
            CompensationState::Completed => {}
            CompensationState::Confirming
            | CompensationState::Confirmed
            | CompensationState::Compensating
            | CompensationState::Compensated => {
                return Err(CompensationError::AlreadySettled(id));
            }
            state => {
                return Err(CompensationError::NotCompleted { id, state });
            }
        }
        match action {
            CompensationAction::Confirm => token.confirm_called = true,
            CompensationAction::Compensate => token.compensate_called = true,
        }
        Ok(ClaimOutcome::Claimed)
    }

    /// Tokens still tracked directly under the virtual root.
    fn root_has_outstanding(&self) -> bool {
        self.lock()
            .tokens
            .get(&CompensationId::ROOT)
            .is_some_and(|root| !root.execution_tracker.is_empty())
    }
}

impl WorkflowExtension for CompensationExtension {
    fn as_persistence_participant(&self) -> Option<&dyn PersistenceParticipant> {
        Some(self)
    }

    fn root_settled(&self, outcome: CompletionState) -> Option<Arc<dyn Activity>> {
        let action = match outcome {
            CompletionState::Closed => CompensationAction::Confirm,
            CompletionState::Canceled => CompensationAction::Compensate,
            // A faulted root runs no automatic pass; outstanding tokens
            // are abandoned with the workflow.
            CompletionState::Faulted => return None,
        };
        if !self.root_has_outstanding() {
            return None;
        }
        tracing::debug!(?action, "running automatic compensation pass");
        Some(Arc::new(DefaultCompensationPass::new(
            CompensationId::ROOT,
            action,
        )))
    }
}

impl PersistenceParticipant for CompensationExtension {
    fn collect_values(&self) -> (HashMap<String, Value>, HashMap<String, Value>) {
        let table = self.lock();
        let tokens: Vec<&CompensationTokenData> = table.tokens.values().collect();
        let mut rw = HashMap::new();
        rw.insert(
            KEY_TOKEN_TABLE.to_string(),
            serde_json::to_value(&tokens).unwrap_or(Value::Null),
        );
        rw.insert(KEY_NEXT_ID.to_string(), Value::from(table.next_id));
        (rw, HashMap::new())
    }

    fn publish_values(&self, values: &HashMap<String, Value>) -> Result<(), PersistenceError> {
        let raw = values
            .get(KEY_TOKEN_TABLE)
            .ok_or_else(|| PersistenceError::MissingValue {
                key: KEY_TOKEN_TABLE.to_string(),
            })?;
        let tokens: Vec<CompensationTokenData> = serde_json::from_value(raw.clone())
            .map_err(|e| PersistenceError::MalformedValue {
                key: KEY_TOKEN_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        let next_id = values
            .get(KEY_NEXT_ID)
            .and_then(Value::as_u64)
            .ok_or_else(|| PersistenceError::MissingValue {
                key: KEY_NEXT_ID.to_string(),
            })?;

        let mut table = self.lock();
        table.tokens = tokens
            .into_iter()
            .map(|t| (t.compensation_id, t))
            .collect();
        table
            .tokens
            .entry(CompensationId::ROOT)
            .or_insert_with(CompensationTokenData::virtual_root);
        table.next_id = next_id;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
