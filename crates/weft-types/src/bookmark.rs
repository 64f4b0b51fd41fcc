//! Bookmark tokens, scopes, options, and the tagged resumption callback.
//!
//! A bookmark decouples "waiting for an external event" from any call
//! stack: the waiting activity records a tagged callback in one resumption
//! table and yields. The callback is a plain `{kind, payload, target}`
//! variant rather than a captured closure, so an idle workflow's entire
//! wait-state serializes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::instance::InstanceId;

// ---------------------------------------------------------------------------
// Bookmark
// ---------------------------------------------------------------------------

/// Opaque suspension token bound to one owning activity instance.
///
/// Lives from creation until explicit removal or resumption.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Bookmark(pub u64);

impl std::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bookmark-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BookmarkScope
// ---------------------------------------------------------------------------

/// Correlation namespace partitioning named bookmarks.
///
/// Identical bookmark names registered under different scopes never
/// collide; a scope typically corresponds to one business correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookmarkScope(pub Uuid);

impl std::fmt::Display for BookmarkScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BookmarkOptions
// ---------------------------------------------------------------------------

/// Creation options for a bookmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkOptions {
    /// Bookmark survives resumption and may fire again (e.g. a stream of
    /// external events). Default: removed on first resume.
    #[serde(default)]
    pub multiple_resume: bool,
    /// Bookmark does not count as blocking work: the owning instance may
    /// complete while it is still registered.
    #[serde(default)]
    pub non_blocking: bool,
}

impl BookmarkOptions {
    pub fn multiple_resume() -> Self {
        Self {
            multiple_resume: true,
            non_blocking: false,
        }
    }

    pub fn non_blocking() -> Self {
        Self {
            multiple_resume: false,
            non_blocking: true,
        }
    }
}

// ---------------------------------------------------------------------------
// BookmarkCallback
// ---------------------------------------------------------------------------

/// Tagged continuation dispatched through the resumption table.
///
/// `kind` is interpreted by the target instance's activity; `payload`
/// carries activity-defined state captured at creation time. Both are plain
/// data, so the continuation persists with the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkCallback {
    /// Instance whose activity receives the resumption.
    pub target: InstanceId,
    /// Activity-defined callback discriminant.
    pub kind: u32,
    /// Activity-defined state captured at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl BookmarkCallback {
    pub fn new(target: InstanceId, kind: u32) -> Self {
        Self {
            target,
            kind,
            payload: None,
        }
    }

    pub fn with_payload(target: InstanceId, kind: u32, payload: Value) -> Self {
        Self {
            target,
            kind,
            payload: Some(payload),
        }
    }
}

// ---------------------------------------------------------------------------
// Resume status
// ---------------------------------------------------------------------------

/// Outcome of a host- or extension-initiated bookmark resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookmarkResumeStatus {
    /// The bookmark was found and the callback was delivered.
    Success,
    /// Unknown or already-removed bookmark. Non-fatal; the caller decides.
    ///
    /// An instance that has reached a terminal outcome also reports
    /// `NotFound` rather than `NotReady`: its bookmarks are gone for good
    /// and a retry can never succeed.
    NotFound,
    /// The instance is not in a resumable state (suspended, mid-unload,
    /// snapshotting). Nothing was lost; the caller should retry.
    NotReady,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the bookmark subsystem itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookmarkError {
    /// A named bookmark already exists under the same scope.
    #[error("bookmark name '{name}' already registered in this scope")]
    NameConflict { name: String },

    /// Referenced scope handle was never created.
    #[error("unknown bookmark scope: {0}")]
    UnknownScope(BookmarkScope),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_roundtrips_through_json() {
        let cb = BookmarkCallback::with_payload(
            InstanceId(3),
            7,
            serde_json::json!({"step": 2}),
        );
        let json = serde_json::to_string(&cb).unwrap();
        let back: BookmarkCallback = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cb);
    }

    #[test]
    fn default_options_are_single_shot_blocking() {
        let opts = BookmarkOptions::default();
        assert!(!opts.multiple_resume);
        assert!(!opts.non_blocking);
    }

    #[test]
    fn bookmark_display() {
        assert_eq!(Bookmark(42).to_string(), "bookmark-42");
    }
}
