//! Durable timer table entries.
//!
//! A timer entry binds a bookmark to an absolute due instant. Due times are
//! wall-clock (`DateTime<Utc>`), never relative, so a table reloaded after a
//! process restart re-arms at the originally scheduled instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bookmark::Bookmark;

/// One durable timer registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEntry {
    /// Bookmark to resume when the timer fires.
    pub bookmark: Bookmark,
    /// Absolute wall-clock instant at which the timer is due.
    pub due: DateTime<Utc>,
    /// Set once a fire attempt came back `NotReady`; the entry is retried,
    /// never discarded.
    #[serde(default)]
    pub retry: bool,
}

impl TimerEntry {
    pub fn new(bookmark: Bookmark, due: DateTime<Utc>) -> Self {
        Self {
            bookmark,
            due,
            retry: false,
        }
    }
}

/// Errors raised by the durable timer extension.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimerError {
    /// Timers cannot be registered for a negative duration.
    #[error("timer duration must not be negative (got {millis} ms)")]
    NegativeDuration { millis: i64 },

    /// The timer table is frozen while a persistence snapshot is in flight.
    #[error("timer table is immutable during a persistence snapshot")]
    SnapshotInProgress,

    /// A bookmark is already registered with the timer table.
    #[error("bookmark {0} already has a registered timer")]
    AlreadyRegistered(Bookmark),

    /// The persisted timer table could not be decoded.
    #[error("malformed persisted timer table: {0}")]
    MalformedTable(String),
}
