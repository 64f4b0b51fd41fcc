//! Host surface: workflow instance handle, proxy, snapshots, runtime.
//!
//! `WorkflowInstance` wraps one executor behind a mutex and exposes the
//! operations a host performs: pump the scheduler, resume bookmarks,
//! cancel, terminate, suspend, snapshot. `InstanceProxy` is the weak
//! handle given to extensions so out-of-band work (a timer firing on a
//! background task) can resume bookmarks without keeping the instance
//! alive. `WorkflowRuntime` is a concurrent registry of live instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use weft_types::bookmark::{Bookmark, BookmarkResumeStatus, BookmarkScope};
use weft_types::config::WeftConfig;
use weft_types::event::EngineEvent;
use weft_types::instance::WorkflowOutcome;

use weft_observe::wf_attrs;

use crate::activity::Activity;
use crate::event::EngineEventBus;
use crate::executor::{Executor, RunPause};
use crate::extension::{PersistenceError, WorkflowExtension};

// ---------------------------------------------------------------------------
// Status & errors
// ---------------------------------------------------------------------------

/// What the instance is doing after a host call returned.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceStatus {
    /// No schedulable work; waiting on bookmarks.
    Idle,
    /// Suspended by the host; resumptions are rejected with `NotReady`.
    Suspended,
    /// An activity asked for a persistence point; snapshot, then pump
    /// again.
    PersistenceRequested,
    /// Final outcome reached.
    Complete(WorkflowOutcome),
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("workflow instance already complete")]
    AlreadyComplete,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Extension state captured at a persistence point.
///
/// `values` are handed back on restore; `diagnostics` are write-only
/// (counters, gauges) and never restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub workflow_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub values: HashMap<String, Value>,
    pub diagnostics: HashMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostPhase {
    Active,
    Suspended,
    Complete,
}

#[derive(Debug)]
struct CoreState {
    executor: Executor,
    phase: HostPhase,
}

#[derive(Debug)]
struct InstanceCore {
    state: Mutex<CoreState>,
}

impl InstanceCore {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// InstanceProxy
// ---------------------------------------------------------------------------

/// Weak handle to one instance, handed to extensions.
///
/// Holds no strong reference: once the host drops the instance, proxy
/// calls degrade to `NotFound` instead of keeping the executor alive.
#[derive(Debug, Clone)]
pub struct InstanceProxy {
    core: Weak<InstanceCore>,
    workflow_id: Uuid,
    events: EngineEventBus,
}

impl InstanceProxy {
    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// Resume a bookmark from outside the scheduler, then pump the
    /// executor until it pauses again.
    pub fn resume_bookmark(&self, bookmark: Bookmark, value: Value) -> BookmarkResumeStatus {
        let span = tracing::debug_span!(
            "resume",
            wf.instance.id = %self.workflow_id,
            wf.bookmark = %bookmark,
            wf.bookmark.status = tracing::field::Empty,
        );
        let _entered = span.enter();
        let status = self.resume_inner(bookmark, value);
        span.record(wf_attrs::WF_BOOKMARK_STATUS, tracing::field::debug(&status));
        status
    }

    fn resume_inner(&self, bookmark: Bookmark, value: Value) -> BookmarkResumeStatus {
        let Some(core) = self.core.upgrade() else {
            return BookmarkResumeStatus::NotFound;
        };
        let mut state = core.lock();
        match state.phase {
            HostPhase::Suspended => return BookmarkResumeStatus::NotReady,
            HostPhase::Complete => return BookmarkResumeStatus::NotFound,
            HostPhase::Active => {}
        }
        let status = state.executor.resume_bookmark(bookmark, value);
        if status == BookmarkResumeStatus::Success {
            // No host present to take a snapshot, so persistence pauses
            // cannot be honored from here; keep pumping.
            loop {
                match state.executor.run() {
                    RunPause::PersistenceRequested => continue,
                    RunPause::Complete(_) => {
                        state.phase = HostPhase::Complete;
                        break;
                    }
                    RunPause::Idle => break,
                }
            }
        }
        status
    }

    /// Publish an event on the instance's bus.
    pub fn publish(&self, event: EngineEvent) {
        self.events.publish(event);
    }
}

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// Host handle to one workflow instance. Cloneable; clones share state.
#[derive(Debug, Clone)]
pub struct WorkflowInstance {
    id: Uuid,
    core: Arc<InstanceCore>,
    events: EngineEventBus,
}

impl WorkflowInstance {
    /// New instance over `root` with default configuration.
    pub fn new(root: Arc<dyn Activity>) -> Self {
        Self::with_config(root, None, WeftConfig::default())
    }

    /// New instance with an input argument and explicit configuration.
    pub fn with_config(
        root: Arc<dyn Activity>,
        input: Option<Value>,
        config: WeftConfig,
    ) -> Self {
        let id = Uuid::now_v7();
        let events = EngineEventBus::new(config.event_capacity);
        let mut executor = Executor::new(id, events.clone());
        executor.start(root, input);
        let core = Arc::new(InstanceCore {
            state: Mutex::new(CoreState {
                executor,
                phase: HostPhase::Active,
            }),
        });
        let proxy = InstanceProxy {
            core: Arc::downgrade(&core),
            workflow_id: id,
            events: events.clone(),
        };
        core.lock().executor.extensions.set_proxy(proxy);
        tracing::info!(workflow_id = %id, "workflow instance created");
        Self { id, core, events }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Register an extension. Must happen before the first `run` for the
    /// extension to see all activity executions.
    pub fn add_extension<T: WorkflowExtension>(&self, extension: Arc<T>) -> Arc<T> {
        self.core.lock().executor.extensions.add(extension)
    }

    /// Subscribe to engine lifecycle events.
    pub fn events(&self) -> &EngineEventBus {
        &self.events
    }

    /// Pump the scheduler until it pauses.
    pub fn run(&self) -> InstanceStatus {
        let span = tracing::debug_span!(
            "pump",
            wf.instance.id = %self.id,
            wf.instance.outcome = tracing::field::Empty,
        );
        let _entered = span.enter();
        let mut state = self.core.lock();
        match state.phase {
            HostPhase::Complete => return InstanceStatus::Complete(self.final_outcome(&state)),
            HostPhase::Suspended => return InstanceStatus::Suspended,
            HostPhase::Active => {}
        }
        match state.executor.run() {
            RunPause::Idle => {
                self.events.publish(EngineEvent::InstanceIdle {
                    workflow_id: self.id,
                });
                InstanceStatus::Idle
            }
            RunPause::PersistenceRequested => InstanceStatus::PersistenceRequested,
            RunPause::Complete(outcome) => {
                state.phase = HostPhase::Complete;
                span.record(wf_attrs::WF_INSTANCE_OUTCOME, outcome.label());
                InstanceStatus::Complete(outcome)
            }
        }
    }

    /// Request graceful cancellation of the whole workflow. Pump with
    /// `run` to drive the cancellation to completion.
    pub fn cancel(&self) {
        self.core.lock().executor.cancel_root();
    }

    /// Abandon everything immediately. No cancellation handlers, no
    /// compensation, no fault propagation.
    pub fn terminate(&self, reason: impl Into<String>) {
        let mut state = self.core.lock();
        state.executor.terminate(reason.into());
        state.phase = HostPhase::Complete;
    }

    /// Resume a bookmark by token and pump the scheduler.
    pub fn resume_bookmark(&self, bookmark: Bookmark, value: Value) -> BookmarkResumeStatus {
        let mut state = self.core.lock();
        match state.phase {
            HostPhase::Suspended => return BookmarkResumeStatus::NotReady,
            HostPhase::Complete => return BookmarkResumeStatus::NotFound,
            HostPhase::Active => {}
        }
        let status = state.executor.resume_bookmark(bookmark, value);
        if status == BookmarkResumeStatus::Success {
            if let RunPause::Complete(_) = state.executor.run() {
                state.phase = HostPhase::Complete;
            }
        }
        status
    }

    /// Resume a named bookmark, optionally within a scope.
    pub fn resume_bookmark_by_name(
        &self,
        name: &str,
        scope: Option<BookmarkScope>,
        value: Value,
    ) -> BookmarkResumeStatus {
        let bookmark = {
            let state = self.core.lock();
            match state.phase {
                HostPhase::Suspended => return BookmarkResumeStatus::NotReady,
                HostPhase::Complete => return BookmarkResumeStatus::NotFound,
                HostPhase::Active => {}
            }
            state.executor.bookmarks.find_by_name(name, scope)
        };
        match bookmark {
            Some(bookmark) => self.resume_bookmark(bookmark, value),
            None => BookmarkResumeStatus::NotFound,
        }
    }

    /// Stop accepting resumptions (they return `NotReady`) without
    /// discarding any state.
    pub fn suspend(&self) {
        let mut state = self.core.lock();
        if state.phase == HostPhase::Active {
            state.phase = HostPhase::Suspended;
        }
    }

    /// Resume accepting work after `suspend`.
    pub fn activate(&self) {
        let mut state = self.core.lock();
        if state.phase == HostPhase::Suspended {
            state.phase = HostPhase::Active;
        }
    }

    /// Collect persistence-participant state into a snapshot.
    ///
    /// Mutating registrations (new timers) fail while the snapshot window
    /// is open.
    pub fn prepare_snapshot(&self) -> Result<InstanceSnapshot, HostError> {
        let state = self.core.lock();
        if state.phase == HostPhase::Complete {
            return Err(HostError::AlreadyComplete);
        }
        let participants: Vec<_> = state.executor.extensions.list().to_vec();
        for handle in &participants {
            if let Some(p) = handle.extension().as_persistence_participant() {
                p.begin_snapshot();
            }
        }
        let mut values = HashMap::new();
        let mut diagnostics = HashMap::new();
        for handle in &participants {
            if let Some(p) = handle.extension().as_persistence_participant() {
                let (rw, wo) = p.collect_values();
                values.extend(rw);
                diagnostics.extend(wo);
            }
        }
        for handle in &participants {
            if let Some(p) = handle.extension().as_persistence_participant() {
                p.end_snapshot();
            }
        }
        Ok(InstanceSnapshot {
            workflow_id: self.id,
            taken_at: Utc::now(),
            values,
            diagnostics,
        })
    }

    /// Hand previously collected values back to every participant.
    pub fn apply_snapshot(&self, snapshot: &InstanceSnapshot) -> Result<(), HostError> {
        let state = self.core.lock();
        if state.phase == HostPhase::Complete {
            return Err(HostError::AlreadyComplete);
        }
        let participants: Vec<_> = state.executor.extensions.list().to_vec();
        drop(state);
        for handle in &participants {
            if let Some(p) = handle.extension().as_persistence_participant() {
                p.publish_values(&snapshot.values)?;
            }
        }
        Ok(())
    }

    /// Final outcome, if the workflow has completed.
    pub fn outcome(&self) -> Option<WorkflowOutcome> {
        self.core.lock().executor.outcome().cloned()
    }

    fn final_outcome(&self, state: &CoreState) -> WorkflowOutcome {
        state
            .executor
            .outcome()
            .cloned()
            .unwrap_or(WorkflowOutcome::Completed)
    }
}

// ---------------------------------------------------------------------------
// WorkflowRuntime
// ---------------------------------------------------------------------------

/// Concurrent registry of live workflow instances.
#[derive(Debug, Default)]
pub struct WorkflowRuntime {
    instances: DashMap<Uuid, WorkflowInstance>,
}

impl WorkflowRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new instance over `root`.
    pub fn spawn(&self, root: Arc<dyn Activity>) -> WorkflowInstance {
        self.spawn_with_config(root, None, WeftConfig::default())
    }

    pub fn spawn_with_config(
        &self,
        root: Arc<dyn Activity>,
        input: Option<Value>,
        config: WeftConfig,
    ) -> WorkflowInstance {
        let instance = WorkflowInstance::with_config(root, input, config);
        self.instances.insert(instance.id(), instance.clone());
        instance
    }

    pub fn get(&self, id: Uuid) -> Option<WorkflowInstance> {
        self.instances.get(&id).map(|entry| entry.clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<WorkflowInstance> {
        self.instances.remove(&id).map(|(_, instance)| instance)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::context::ActivityContext;
    use weft_types::bookmark::BookmarkOptions;
    use weft_types::fault::WorkflowFault;

    struct NamedWait;

    impl Activity for NamedWait {
        fn display_name(&self) -> &str {
            "named-wait"
        }

        fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
            ctx.create_named_bookmark("go", None, 1, None, BookmarkOptions::default())
                .map_err(|e| WorkflowFault::usage(e.to_string()))?;
            Ok(())
        }
    }

    #[test]
    fn run_resume_complete() {
        let instance = WorkflowInstance::new(Arc::new(NamedWait));
        assert_eq!(instance.run(), InstanceStatus::Idle);

        let status = instance.resume_bookmark_by_name("go", None, Value::Null);
        assert_eq!(status, BookmarkResumeStatus::Success);
        assert_eq!(instance.outcome(), Some(WorkflowOutcome::Completed));
    }

    #[test]
    fn suspended_instance_rejects_resumption() {
        let instance = WorkflowInstance::new(Arc::new(NamedWait));
        instance.run();
        instance.suspend();
        assert_eq!(
            instance.resume_bookmark_by_name("go", None, Value::Null),
            BookmarkResumeStatus::NotReady
        );

        instance.activate();
        assert_eq!(
            instance.resume_bookmark_by_name("go", None, Value::Null),
            BookmarkResumeStatus::Success
        );
    }

    #[test]
    fn completed_instance_reports_not_found() {
        let instance = WorkflowInstance::new(Arc::new(NamedWait));
        instance.run();
        instance.resume_bookmark_by_name("go", None, Value::Null);
        assert_eq!(
            instance.resume_bookmark_by_name("go", None, Value::Null),
            BookmarkResumeStatus::NotFound
        );
    }

    #[test]
    fn terminate_wins_over_everything() {
        let instance = WorkflowInstance::new(Arc::new(NamedWait));
        instance.run();
        instance.terminate("shutting down");
        assert_eq!(
            instance.outcome(),
            Some(WorkflowOutcome::Terminated {
                reason: "shutting down".into()
            })
        );
        assert_eq!(
            instance.resume_bookmark_by_name("go", None, Value::Null),
            BookmarkResumeStatus::NotFound
        );
    }

    #[test]
    fn runtime_registry_tracks_instances() {
        let runtime = WorkflowRuntime::new();
        let instance = runtime.spawn(Arc::new(NamedWait));
        assert_eq!(runtime.len(), 1);
        assert!(runtime.get(instance.id()).is_some());
        runtime.remove(instance.id());
        assert!(runtime.is_empty());
    }
}
