//! Durable timer extension.
//!
//! Keeps a table of `bookmark -> absolute due instant` and arms one tokio
//! task per entry. Due times are wall-clock, so a table restored from a
//! snapshot re-arms at the originally scheduled instant rather than
//! restarting the wait. The table freezes while a persistence snapshot is
//! in flight; registrations during the window fail and fire attempts are
//! retried after it closes.
//!
//! Lock order: the timer mutex is never held across a proxy call. The
//! fire path reads its entry under the timer lock, drops the lock, and
//! only then resumes the bookmark (which takes the instance lock). The
//! entry is removed only once the resume resolves as `Success` or
//! `NotFound`; a `NotReady` attempt leaves it in the table, so a snapshot
//! taken at any point between fires still carries it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use weft_types::bookmark::{Bookmark, BookmarkResumeStatus};
use weft_types::event::EngineEvent;
use weft_types::timer::{TimerEntry, TimerError};

use crate::extension::{PersistenceError, PersistenceParticipant, WorkflowExtension};
use crate::host::InstanceProxy;

/// Persisted-value key for the timer table.
pub const KEY_TIMER_TABLE: &str = "weft.timer/table";
/// Diagnostics key: number of armed timers at snapshot time.
pub const KEY_PENDING_COUNT: &str = "weft.timer/pending_count";

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct ArmedEntry {
    entry: TimerEntry,
    disarm: CancellationToken,
}

#[derive(Debug, Default)]
struct TimerState {
    proxy: Option<InstanceProxy>,
    entries: HashMap<Bookmark, ArmedEntry>,
    immutable: bool,
}

#[derive(Debug)]
struct TimerShared {
    retry_interval: Duration,
    state: Mutex<TimerState>,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// DurableTimerExtension
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DurableTimerExtension {
    shared: Arc<TimerShared>,
}

impl Default for DurableTimerExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableTimerExtension {
    pub fn new() -> Self {
        Self::with_retry_interval(DEFAULT_RETRY_INTERVAL)
    }

    /// Build with the retry interval from engine configuration.
    pub fn from_config(config: &weft_types::config::WeftConfig) -> Self {
        Self::with_retry_interval(config.timer_retry_interval())
    }

    /// Override the delay between `NotReady` fire retries.
    pub fn with_retry_interval(retry_interval: Duration) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                retry_interval,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Register a timer that resumes `bookmark` after `delay`.
    pub fn register_timer(&self, bookmark: Bookmark, delay: TimeDelta) -> Result<(), TimerError> {
        if delay < TimeDelta::zero() {
            return Err(TimerError::NegativeDuration {
                millis: delay.num_milliseconds(),
            });
        }
        let due = Utc::now() + delay;
        let disarm = {
            let mut state = self.shared.lock();
            if state.immutable {
                return Err(TimerError::SnapshotInProgress);
            }
            if state.entries.contains_key(&bookmark) {
                return Err(TimerError::AlreadyRegistered(bookmark));
            }
            let disarm = CancellationToken::new();
            state.entries.insert(
                bookmark,
                ArmedEntry {
                    entry: TimerEntry::new(bookmark, due),
                    disarm: disarm.clone(),
                },
            );
            disarm
        };
        tracing::debug!(%bookmark, %due, "timer armed");
        tokio::spawn(fire_loop(self.shared.clone(), bookmark, disarm));
        Ok(())
    }

    /// Disarm a timer before it fires. Returns whether an entry existed.
    pub fn cancel_timer(&self, bookmark: Bookmark) -> Result<bool, TimerError> {
        let (removed, proxy) = {
            let mut state = self.shared.lock();
            if state.immutable {
                return Err(TimerError::SnapshotInProgress);
            }
            (state.entries.remove(&bookmark), state.proxy.clone())
        };
        let Some(armed) = removed else {
            return Ok(false);
        };
        armed.disarm.cancel();
        tracing::debug!(%bookmark, "timer canceled");
        if let Some(proxy) = proxy {
            proxy.publish(EngineEvent::TimerCanceled { bookmark });
        }
        Ok(true)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }
}

impl WorkflowExtension for DurableTimerExtension {
    fn set_instance(&self, proxy: InstanceProxy) {
        self.shared.lock().proxy = Some(proxy);
    }

    fn as_persistence_participant(&self) -> Option<&dyn PersistenceParticipant> {
        Some(self)
    }
}

impl PersistenceParticipant for DurableTimerExtension {
    fn collect_values(&self) -> (HashMap<String, Value>, HashMap<String, Value>) {
        let state = self.shared.lock();
        let table: Vec<&TimerEntry> = state.entries.values().map(|a| &a.entry).collect();
        let mut rw = HashMap::new();
        rw.insert(
            KEY_TIMER_TABLE.to_string(),
            serde_json::to_value(&table).unwrap_or(Value::Null),
        );
        let mut wo = HashMap::new();
        wo.insert(KEY_PENDING_COUNT.to_string(), Value::from(table.len()));
        (rw, wo)
    }

    /// Re-arm every persisted entry at its original due instant. Entries
    /// already past due fire immediately.
    fn publish_values(&self, values: &HashMap<String, Value>) -> Result<(), PersistenceError> {
        let raw = values
            .get(KEY_TIMER_TABLE)
            .ok_or_else(|| PersistenceError::MissingValue {
                key: KEY_TIMER_TABLE.to_string(),
            })?;
        let table: Vec<TimerEntry> =
            serde_json::from_value(raw.clone()).map_err(|e| PersistenceError::MalformedValue {
                key: KEY_TIMER_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        for entry in table {
            let disarm = {
                let mut state = self.shared.lock();
                if state.entries.contains_key(&entry.bookmark) {
                    continue;
                }
                let disarm = CancellationToken::new();
                state.entries.insert(
                    entry.bookmark,
                    ArmedEntry {
                        entry: entry.clone(),
                        disarm: disarm.clone(),
                    },
                );
                disarm
            };
            tracing::debug!(bookmark = %entry.bookmark, due = %entry.due, "timer re-armed");
            tokio::spawn(fire_loop(self.shared.clone(), entry.bookmark, disarm));
        }
        Ok(())
    }

    fn begin_snapshot(&self) {
        self.shared.lock().immutable = true;
    }

    fn end_snapshot(&self) {
        self.shared.lock().immutable = false;
    }
}

// ---------------------------------------------------------------------------
// Fire path
// ---------------------------------------------------------------------------

async fn fire_loop(shared: Arc<TimerShared>, bookmark: Bookmark, disarm: CancellationToken) {
    loop {
        let due = match shared.lock().entries.get(&bookmark) {
            Some(armed) => armed.entry.due,
            None => return,
        };
        let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = disarm.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        let proxy = {
            let state = shared.lock();
            if !state.entries.contains_key(&bookmark) {
                // Canceled while we slept.
                return;
            }
            if state.immutable {
                // Table frozen for a snapshot; retry after the window.
                None
            } else {
                state.proxy.clone()
            }
        };

        let Some(proxy) = proxy else {
            // Frozen or instance not attached yet.
            tokio::select! {
                _ = disarm.cancelled() => return,
                _ = tokio::time::sleep(shared.retry_interval) => {}
            }
            continue;
        };

        // The entry stays in the table until the resume resolves, so a
        // snapshot collected mid-fire still carries it; a restored
        // duplicate fire resolves as `NotFound` below and drops out.
        match proxy.resume_bookmark(bookmark, Value::Null) {
            BookmarkResumeStatus::Success => {
                shared.lock().entries.remove(&bookmark);
                tracing::debug!(%bookmark, "timer fired");
                proxy.publish(EngineEvent::TimerFired { bookmark });
                return;
            }
            BookmarkResumeStatus::NotFound => {
                shared.lock().entries.remove(&bookmark);
                return;
            }
            BookmarkResumeStatus::NotReady => {
                // Flag the entry as a retry and try again after the
                // retry interval.
                {
                    let mut state = shared.lock();
                    if let Some(armed) = state.entries.get_mut(&bookmark) {
                        armed.entry.retry = true;
                    }
                }
                tokio::select! {
                    _ = disarm.cancelled() => return,
                    _ = tokio::time::sleep(shared.retry_interval) => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn negative_duration_is_rejected() {
        let timer = DurableTimerExtension::new();
        let err = timer
            .register_timer(Bookmark(1), TimeDelta::milliseconds(-10))
            .unwrap_err();
        assert!(matches!(err, TimerError::NegativeDuration { millis: -10 }));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let timer = DurableTimerExtension::new();
        timer
            .register_timer(Bookmark(1), TimeDelta::seconds(60))
            .unwrap();
        let err = timer
            .register_timer(Bookmark(1), TimeDelta::seconds(60))
            .unwrap_err();
        assert!(matches!(err, TimerError::AlreadyRegistered(Bookmark(1))));
    }

    #[tokio::test]
    async fn snapshot_window_freezes_the_table() {
        let timer = DurableTimerExtension::new();
        timer.begin_snapshot();
        assert!(matches!(
            timer.register_timer(Bookmark(1), TimeDelta::seconds(1)),
            Err(TimerError::SnapshotInProgress)
        ));
        assert!(matches!(
            timer.cancel_timer(Bookmark(1)),
            Err(TimerError::SnapshotInProgress)
        ));
        timer.end_snapshot();
        timer
            .register_timer(Bookmark(1), TimeDelta::seconds(1))
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_removes_the_entry() {
        let timer = DurableTimerExtension::new();
        timer
            .register_timer(Bookmark(7), TimeDelta::seconds(60))
            .unwrap();
        assert_eq!(timer.pending(), 1);
        assert!(timer.cancel_timer(Bookmark(7)).unwrap());
        assert_eq!(timer.pending(), 0);
        // Second cancel: nothing left.
        assert!(!timer.cancel_timer(Bookmark(7)).unwrap());
    }

    #[tokio::test]
    async fn collected_table_preserves_due_instants() {
        let timer = DurableTimerExtension::new();
        timer
            .register_timer(Bookmark(3), TimeDelta::seconds(30))
            .unwrap();
        let (rw, wo) = timer.collect_values();
        let table: Vec<TimerEntry> =
            serde_json::from_value(rw.get(KEY_TIMER_TABLE).unwrap().clone()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].bookmark, Bookmark(3));
        assert!(table[0].due > Utc::now() + TimeDelta::seconds(25));
        assert_eq!(wo.get(KEY_PENDING_COUNT), Some(&Value::from(1usize)));
    }

    #[tokio::test]
    async fn restored_table_rearms_entries() {
        let timer = DurableTimerExtension::new();
        timer
            .register_timer(Bookmark(3), TimeDelta::seconds(30))
            .unwrap();
        let (rw, _) = timer.collect_values();

        let restored = DurableTimerExtension::new();
        restored.publish_values(&rw).unwrap();
        assert_eq!(restored.pending(), 1);
    }
}
