//! Work-list executor: the cooperative, single-threaded scheduler.
//!
//! All activity code runs on one logical thread. The executor owns the
//! instance arena, the bookmark table, and the extension registry, and
//! drains a FIFO work list of `Execute` / `Resume` / `Cancel` items until
//! either the list empties (the instance goes idle on its bookmarks), a
//! persistence pause is requested, or the workflow reaches a terminal
//! outcome.
//!
//! Completion is not a work item: whenever an instance might have become
//! quiet (after dispatch, after a child settles) the executor checks the
//! quiescence conditions synchronously and, if met, settles the instance
//! and notifies its parent in the same pass.

pub mod arena;
pub mod context;

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use weft_types::bookmark::{Bookmark, BookmarkCallback, BookmarkResumeStatus};
use weft_types::event::EngineEvent;
use weft_types::fault::{FaultContext, WorkflowFault};
use weft_types::instance::{
    ActivityInstanceState, CompletionState, InstanceId, WorkflowOutcome,
};

use crate::activity::{Activity, BookmarkResumption, ChildCompletion, FaultDisposition};
use crate::bookmark::BookmarkManager;
use crate::event::EngineEventBus;
use crate::extension::ExtensionRegistry;

use weft_observe::wf_attrs;

use arena::InstanceArena;
use context::ActivityContext;

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// One unit of scheduler work.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Run the instance's `execute` entry point.
    Execute(InstanceId),
    /// Deliver a bookmark resumption to its owner.
    Resume {
        bookmark: Bookmark,
        target: InstanceId,
        kind: u32,
        payload: Option<Value>,
        value: Value,
    },
    /// Deliver a cancellation request.
    Cancel(InstanceId),
}

impl WorkItem {
    fn target(&self) -> InstanceId {
        match self {
            WorkItem::Execute(id) => *id,
            WorkItem::Resume { target, .. } => *target,
            WorkItem::Cancel(id) => *id,
        }
    }
}

/// Why `run` returned control to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RunPause {
    /// Work list drained; the instance is idle on its bookmarks.
    Idle,
    /// An activity requested a persistence point and no no-persist block
    /// is open.
    PersistenceRequested,
    /// The workflow reached a final outcome.
    Complete(WorkflowOutcome),
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    workflow_id: Uuid,
    pub(crate) arena: InstanceArena,
    worklist: VecDeque<WorkItem>,
    pub(crate) bookmarks: BookmarkManager,
    pub(crate) extensions: ExtensionRegistry,
    events: EngineEventBus,
    root: Option<InstanceId>,
    root_outcome: Option<CompletionState>,
    /// First unhandled fault observed at a parentless node.
    root_fault: Option<FaultContext>,
    settle_hook_done: bool,
    persist_requested: bool,
    no_persist_depth: u32,
    completion: Option<WorkflowOutcome>,
}

impl Executor {
    pub fn new(workflow_id: Uuid, events: EngineEventBus) -> Self {
        Self {
            workflow_id,
            arena: InstanceArena::new(),
            worklist: VecDeque::new(),
            bookmarks: BookmarkManager::new(),
            extensions: ExtensionRegistry::new(),
            events,
            root: None,
            root_outcome: None,
            root_fault: None,
            settle_hook_done: false,
            persist_requested: false,
            no_persist_depth: 0,
            completion: None,
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn events(&self) -> &EngineEventBus {
        &self.events
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_some()
    }

    pub fn outcome(&self) -> Option<&WorkflowOutcome> {
        self.completion.as_ref()
    }

    /// Schedule the root activity. Idempotent guard: a second start is
    /// ignored.
    pub fn start(&mut self, root: Arc<dyn Activity>, input: Option<Value>) {
        if self.root.is_some() {
            return;
        }
        let id = self.schedule(root, None, None, None, input, false);
        self.root = Some(id);
        self.events.publish(EngineEvent::InstanceStarted {
            workflow_id: self.workflow_id,
        });
    }

    /// Drain the work list until a pause condition holds.
    pub fn run(&mut self) -> RunPause {
        loop {
            if let Some(outcome) = &self.completion {
                return RunPause::Complete(outcome.clone());
            }
            if self.persist_requested && self.no_persist_depth == 0 {
                self.persist_requested = false;
                return RunPause::PersistenceRequested;
            }
            let Some(item) = self.worklist.pop_front() else {
                break;
            };
            self.dispatch(item);
        }
        self.maybe_finalize();
        match &self.completion {
            Some(outcome) => RunPause::Complete(outcome.clone()),
            None => RunPause::Idle,
        }
    }

    /// Abandon all in-flight work and settle the workflow as terminated.
    ///
    /// Bypasses cancellation, compensation, and fault handling entirely.
    pub fn terminate(&mut self, reason: String) {
        if self.completion.is_some() {
            return;
        }
        self.worklist.clear();
        self.bookmarks.clear();
        for id in self.arena.live_ids() {
            self.arena.remove(id);
        }
        tracing::warn!(workflow_id = %self.workflow_id, reason, "workflow terminated");
        self.finish(WorkflowOutcome::Terminated { reason });
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    pub(crate) fn schedule(
        &mut self,
        activity: Arc<dyn Activity>,
        parent: Option<InstanceId>,
        completion_tag: Option<u32>,
        fault_tag: Option<u32>,
        argument: Option<Value>,
        secondary_root: bool,
    ) -> InstanceId {
        let id = self
            .arena
            .allocate(activity, parent, completion_tag, fault_tag, argument);
        let name = self
            .arena
            .get(id)
            .map(|n| n.name.clone())
            .unwrap_or_default();
        if secondary_root {
            if let Some(node) = self.arena.get_mut(id) {
                node.secondary_root = true;
            }
        }
        tracing::debug!(
            workflow_id = %self.workflow_id,
            instance = %id,
            activity = %name,
            "activity scheduled"
        );
        self.events.publish(EngineEvent::ActivityScheduled {
            workflow_id: self.workflow_id,
            instance: id,
            activity: name,
        });
        self.enqueue(WorkItem::Execute(id));
        id
    }

    fn enqueue(&mut self, item: WorkItem) {
        if let Some(node) = self.arena.get_mut(item.target()) {
            node.pending_items += 1;
            self.worklist.push_back(item);
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, item: WorkItem) {
        let target = item.target();
        let Some(node) = self.arena.get_mut(target) else {
            // Owner settled while the item was queued.
            return;
        };
        node.pending_items = node.pending_items.saturating_sub(1);
        let name = node.name.clone();

        let op = match &item {
            WorkItem::Execute(_) => wf_attrs::OP_EXECUTE,
            WorkItem::Resume { .. } => wf_attrs::OP_RESUME,
            WorkItem::Cancel(_) => wf_attrs::OP_CANCEL,
        };
        let span = tracing::debug_span!(
            "dispatch",
            wf.op = op,
            wf.activity.instance = %target,
            wf.activity.name = %name,
            wf.activity.outcome = tracing::field::Empty,
            wf.fault.code = tracing::field::Empty,
        );
        let _entered = span.enter();

        match item {
            WorkItem::Execute(id) => self.dispatch_execute(id),
            WorkItem::Resume {
                bookmark,
                target,
                kind,
                payload,
                value,
            } => self.dispatch_resume(target, bookmark, kind, payload, value),
            WorkItem::Cancel(id) => self.dispatch_cancel(id),
        }
    }

    fn dispatch_execute(&mut self, id: InstanceId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if node.cancel_requested {
            // Canceled before it ever ran: settle without executing.
            node.executed = true;
            node.marked_canceled = true;
            self.try_complete(id);
            return;
        }
        let activity = node.activity.clone();
        let result = activity.execute(&mut ActivityContext::new(self, id));
        if let Some(node) = self.arena.get_mut(id) {
            node.executed = true;
        }
        match result {
            Ok(()) => self.try_complete(id),
            Err(fault) => self.fault_instance(id, FaultContext { fault, source: id }),
        }
    }

    fn dispatch_resume(
        &mut self,
        target: InstanceId,
        bookmark: Bookmark,
        kind: u32,
        payload: Option<Value>,
        value: Value,
    ) {
        let Some(node) = self.arena.get(target) else {
            return;
        };
        if node.state.is_terminal() {
            return;
        }
        let activity = node.activity.clone();
        let resumption = BookmarkResumption {
            bookmark,
            kind,
            payload,
            value,
        };
        let result = activity.bookmark_resumed(&mut ActivityContext::new(self, target), resumption);
        match result {
            Ok(()) => self.try_complete(target),
            Err(fault) => self.fault_instance(
                target,
                FaultContext {
                    fault,
                    source: target,
                },
            ),
        }
    }

    fn dispatch_cancel(&mut self, id: InstanceId) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if node.state.is_terminal() || node.state == ActivityInstanceState::Faulting {
            return;
        }
        let activity = node.activity.clone();
        let result = activity.cancel(&mut ActivityContext::new(self, id));
        match result {
            Ok(()) => self.try_complete(id),
            Err(fault) => self.fault_instance(id, FaultContext { fault, source: id }),
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Request cancellation of a subtree rooted at `id`.
    ///
    /// `pierce_shield` is set for targeted cancels (owner canceling one
    /// known child, fault teardown); blanket child sweeps leave shielded
    /// children alone.
    pub(crate) fn request_cancel(&mut self, id: InstanceId, pierce_shield: bool) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if node.state.is_terminal()
            || node.state == ActivityInstanceState::Faulting
            || node.cancel_requested
        {
            return;
        }
        if node.shielded && !pierce_shield {
            return;
        }
        node.cancel_requested = true;
        if node.state == ActivityInstanceState::Executing {
            node.state = ActivityInstanceState::Canceling;
        }
        if node.executed {
            self.enqueue(WorkItem::Cancel(id));
        }
        // Not yet executed: the pending Execute item settles it canceled.
    }

    /// Host-initiated cancel of the whole workflow.
    pub fn cancel_root(&mut self) {
        if let Some(root) = self.root {
            self.request_cancel(root, true);
        }
    }

    // -----------------------------------------------------------------------
    // Faults
    // -----------------------------------------------------------------------

    /// Put `id` into `Faulting`: record the fault (first one wins), tear
    /// down all children regardless of shields, then settle when quiet.
    pub(crate) fn fault_instance(&mut self, id: InstanceId, ctx: FaultContext) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if node.state.is_terminal() {
            return;
        }
        if node.pending_fault.is_none() {
            tracing::debug!(
                workflow_id = %self.workflow_id,
                instance = %id,
                fault = %ctx.fault,
                "instance faulting"
            );
            tracing::Span::current().record(wf_attrs::WF_FAULT_CODE, ctx.fault.code.as_str());
            node.pending_fault = Some(ctx);
        }
        node.state = ActivityInstanceState::Faulting;
        let children = node.children.clone();
        for child in children {
            self.request_cancel(child, true);
        }
        self.try_complete(id);
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Settle `id` if it is quiet, then propagate to its parent.
    pub(crate) fn try_complete(&mut self, id: InstanceId) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if node.state.is_terminal() || !node.is_quiet() {
            return;
        }
        let faulting = node.state == ActivityInstanceState::Faulting;
        let canceled = node.marked_canceled;
        if !faulting && !canceled && node.blocking_bookmarks > 0 {
            // Parked on its bookmarks.
            return;
        }

        let outcome = if faulting {
            CompletionState::Faulted
        } else if canceled {
            CompletionState::Canceled
        } else {
            CompletionState::Closed
        };

        // Any bookmarks still registered are dead now.
        self.bookmarks.remove_owned_by(id);

        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        node.state = match outcome {
            CompletionState::Closed => ActivityInstanceState::Closed,
            CompletionState::Canceled => ActivityInstanceState::Canceled,
            CompletionState::Faulted => ActivityInstanceState::Faulted,
        };
        let name = node.name.clone();
        tracing::debug!(
            workflow_id = %self.workflow_id,
            instance = %id,
            activity = %name,
            outcome = ?outcome,
            "activity settled"
        );
        tracing::Span::current().record(
            wf_attrs::WF_ACTIVITY_OUTCOME,
            tracing::field::debug(outcome),
        );
        self.events.publish(EngineEvent::ActivityCompleted {
            workflow_id: self.workflow_id,
            instance: id,
            activity: name,
            outcome,
        });

        let Some(node) = self.arena.remove(id) else {
            return;
        };
        let fault_ctx = node.pending_fault.clone().unwrap_or_else(|| FaultContext {
            fault: WorkflowFault::internal("instance faulted without a recorded fault"),
            source: id,
        });

        match node.parent {
            Some(parent) => {
                match outcome {
                    CompletionState::Faulted => {
                        self.notify_parent_faulted(parent, node.fault_tag, fault_ctx)
                    }
                    _ => self.notify_parent_completed(
                        parent,
                        node.completion_tag,
                        ChildCompletion {
                            instance: id,
                            outcome,
                            result: node.result,
                        },
                    ),
                }
                self.try_complete(parent);
            }
            None => self.settle_parentless(id, outcome, fault_ctx),
        }
    }

    fn notify_parent_completed(
        &mut self,
        parent: InstanceId,
        tag: Option<u32>,
        completion: ChildCompletion,
    ) {
        let Some(tag) = tag else { return };
        let Some(parent_node) = self.arena.get(parent) else {
            return;
        };
        if parent_node.state.is_terminal()
            || parent_node.state == ActivityInstanceState::Faulting
        {
            return;
        }
        let activity = parent_node.activity.clone();
        if let Err(fault) =
            activity.child_completed(&mut ActivityContext::new(self, parent), completion, tag)
        {
            self.fault_instance(
                parent,
                FaultContext {
                    fault,
                    source: parent,
                },
            );
        }
    }

    fn notify_parent_faulted(
        &mut self,
        parent: InstanceId,
        tag: Option<u32>,
        fault_ctx: FaultContext,
    ) {
        let Some(parent_node) = self.arena.get(parent) else {
            return;
        };
        if parent_node.state.is_terminal()
            || parent_node.state == ActivityInstanceState::Faulting
        {
            // Already winding down; the recorded fault wins.
            return;
        }
        let disposition = match tag {
            Some(tag) => {
                let activity = parent_node.activity.clone();
                activity.child_faulted(&mut ActivityContext::new(self, parent), &fault_ctx, tag)
            }
            None => Ok(FaultDisposition::Unhandled),
        };
        match disposition {
            Ok(FaultDisposition::Handled) => {}
            Ok(FaultDisposition::Unhandled) => self.fault_instance(parent, fault_ctx),
            Err(fault) => self.fault_instance(
                parent,
                FaultContext {
                    fault,
                    source: parent,
                },
            ),
        }
    }

    fn settle_parentless(
        &mut self,
        id: InstanceId,
        outcome: CompletionState,
        fault_ctx: FaultContext,
    ) {
        if self.root == Some(id) {
            self.root_outcome = Some(outcome);
            if outcome == CompletionState::Faulted {
                self.root_fault.get_or_insert(fault_ctx);
            }
            self.on_root_settled();
        } else if outcome == CompletionState::Faulted && self.root_fault.is_none() {
            // A secondary-root tree faulted; that fells the workflow.
            self.root_fault = Some(fault_ctx);
        }
        self.maybe_finalize();
    }

    /// Offer each extension, in registration order, the chance to run
    /// follow-up work now that the root has settled. Fires exactly once.
    fn on_root_settled(&mut self) {
        if self.settle_hook_done {
            return;
        }
        self.settle_hook_done = true;
        let Some(outcome) = self.root_outcome else {
            return;
        };
        let handles: Vec<_> = self.extensions.list().to_vec();
        for handle in handles {
            if let Some(activity) = handle.extension().root_settled(outcome) {
                self.schedule(activity, None, None, None, None, true);
            }
        }
    }

    /// Complete the workflow once the root has settled, the settle hooks
    /// ran, and no schedulable work remains. Instances still parked on
    /// bookmarks at that point are abandoned.
    fn maybe_finalize(&mut self) {
        if self.completion.is_some()
            || self.root_outcome.is_none()
            || !self.settle_hook_done
            || !self.worklist.is_empty()
        {
            return;
        }
        for id in self.arena.live_ids() {
            self.bookmarks.remove_owned_by(id);
            self.arena.remove(id);
        }
        let outcome = match (&self.root_fault, self.root_outcome) {
            (Some(ctx), _) => WorkflowOutcome::Faulted {
                fault: ctx.fault.clone(),
            },
            (None, Some(CompletionState::Canceled)) => WorkflowOutcome::Canceled,
            _ => WorkflowOutcome::Completed,
        };
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: WorkflowOutcome) {
        tracing::info!(
            workflow_id = %self.workflow_id,
            outcome = outcome.label(),
            "workflow complete"
        );
        self.events.publish(EngineEvent::InstanceCompleted {
            workflow_id: self.workflow_id,
            outcome: outcome.label().to_string(),
        });
        self.completion = Some(outcome);
    }

    // -----------------------------------------------------------------------
    // Bookmarks
    // -----------------------------------------------------------------------

    pub(crate) fn register_bookmark(
        &mut self,
        callback: BookmarkCallback,
        options: weft_types::bookmark::BookmarkOptions,
    ) -> Bookmark {
        let owner = callback.target;
        let bookmark = self.bookmarks.create(callback, options);
        if !options.non_blocking {
            if let Some(node) = self.arena.get_mut(owner) {
                node.blocking_bookmarks += 1;
            }
        }
        bookmark
    }

    pub(crate) fn unregister_bookmark(&mut self, bookmark: Bookmark) {
        if let Some(record) = self.bookmarks.remove(bookmark) {
            self.release_blocking(&record);
        }
    }

    fn release_blocking(&mut self, record: &crate::bookmark::BookmarkRecord) {
        if record.options.non_blocking {
            return;
        }
        if let Some(node) = self.arena.get_mut(record.callback.target) {
            node.blocking_bookmarks = node.blocking_bookmarks.saturating_sub(1);
        }
    }

    /// Resume a bookmark: consume the registration (unless it allows
    /// multiple resumes) and queue the callback for dispatch.
    pub fn resume_bookmark(&mut self, bookmark: Bookmark, value: Value) -> BookmarkResumeStatus {
        if self.completion.is_some() {
            return BookmarkResumeStatus::NotFound;
        }
        let Some(record) = self.bookmarks.resume(bookmark) else {
            return BookmarkResumeStatus::NotFound;
        };
        if !record.options.multiple_resume {
            self.release_blocking(&record);
        }
        let owner = record.callback.target;
        self.enqueue(WorkItem::Resume {
            bookmark,
            target: owner,
            kind: record.callback.kind,
            payload: record.callback.payload,
            value,
        });
        self.events.publish(EngineEvent::BookmarkResumed {
            workflow_id: self.workflow_id,
            bookmark,
            owner,
        });
        BookmarkResumeStatus::Success
    }

    /// Resolve a named bookmark and resume it.
    pub fn resume_bookmark_by_name(
        &mut self,
        name: &str,
        scope: Option<weft_types::bookmark::BookmarkScope>,
        value: Value,
    ) -> BookmarkResumeStatus {
        match self.bookmarks.find_by_name(name, scope) {
            Some(bookmark) => self.resume_bookmark(bookmark, value),
            None => BookmarkResumeStatus::NotFound,
        }
    }

    // -----------------------------------------------------------------------
    // Persistence pause plumbing
    // -----------------------------------------------------------------------

    pub(crate) fn request_persist(&mut self) {
        self.persist_requested = true;
    }

    pub(crate) fn enter_no_persist(&mut self) {
        self.no_persist_depth += 1;
    }

    pub(crate) fn exit_no_persist(&mut self) {
        self.no_persist_depth = self.no_persist_depth.saturating_sub(1);
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("workflow_id", &self.workflow_id)
            .field("live_instances", &self.arena.live_count())
            .field("worklist", &self.worklist.len())
            .field("bookmarks", &self.bookmarks.len())
            .field("completion", &self.completion)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::bookmark::BookmarkOptions;

    fn executor() -> Executor {
        Executor::new(Uuid::now_v7(), EngineEventBus::new(64))
    }

    struct Leaf;

    impl Activity for Leaf {
        fn display_name(&self) -> &str {
            "leaf"
        }

        fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
            ctx.set_result(serde_json::json!("done"));
            Ok(())
        }
    }

    struct Wait;

    impl Activity for Wait {
        fn display_name(&self) -> &str {
            "wait"
        }

        fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
            let bm = ctx.create_bookmark(1, None, BookmarkOptions::default());
            ctx.set_result(serde_json::json!(bm.0));
            Ok(())
        }
    }

    struct Boom;

    impl Activity for Boom {
        fn display_name(&self) -> &str {
            "boom"
        }

        fn execute(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
            Err(WorkflowFault::new("app.boom", "it broke"))
        }
    }

    struct Parent;

    impl Activity for Parent {
        fn display_name(&self) -> &str {
            "parent"
        }

        fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
            ctx.schedule_activity(Arc::new(Leaf), Some(1), None);
            ctx.schedule_activity(Arc::new(Leaf), Some(2), None);
            Ok(())
        }
    }

    #[test]
    fn leaf_root_runs_to_completion() {
        let mut exec = executor();
        exec.start(Arc::new(Leaf), None);
        let pause = exec.run();
        assert_eq!(pause, RunPause::Complete(WorkflowOutcome::Completed));
        assert_eq!(exec.arena.live_count(), 0);
    }

    #[test]
    fn parent_waits_for_children() {
        let mut exec = executor();
        exec.start(Arc::new(Parent), None);
        assert_eq!(exec.run(), RunPause::Complete(WorkflowOutcome::Completed));
    }

    #[test]
    fn bookmark_parks_then_resume_completes() {
        let mut exec = executor();
        exec.start(Arc::new(Wait), None);
        assert_eq!(exec.run(), RunPause::Idle);
        assert_eq!(exec.bookmarks.len(), 1);

        // Bookmark ids start at 1.
        assert_eq!(
            exec.resume_bookmark(Bookmark(1), Value::Null),
            BookmarkResumeStatus::Success
        );
        assert_eq!(exec.run(), RunPause::Complete(WorkflowOutcome::Completed));
    }

    #[test]
    fn resume_of_unknown_bookmark_is_not_found() {
        let mut exec = executor();
        exec.start(Arc::new(Wait), None);
        exec.run();
        assert_eq!(
            exec.resume_bookmark(Bookmark(42), Value::Null),
            BookmarkResumeStatus::NotFound
        );
        // The waiting instance is untouched.
        assert_eq!(exec.run(), RunPause::Idle);
    }

    #[test]
    fn unhandled_fault_fells_the_workflow() {
        let mut exec = executor();
        exec.start(Arc::new(Boom), None);
        match exec.run() {
            RunPause::Complete(WorkflowOutcome::Faulted { fault }) => {
                assert_eq!(fault.code.as_str(), "app.boom");
            }
            other => panic!("unexpected pause: {other:?}"),
        }
    }

    #[test]
    fn cancel_root_settles_canceled() {
        let mut exec = executor();
        exec.start(Arc::new(Wait), None);
        assert_eq!(exec.run(), RunPause::Idle);
        exec.cancel_root();
        assert_eq!(exec.run(), RunPause::Complete(WorkflowOutcome::Canceled));
        assert!(exec.bookmarks.is_empty());
    }

    #[test]
    fn terminate_bypasses_everything() {
        let mut exec = executor();
        exec.start(Arc::new(Wait), None);
        exec.run();
        exec.terminate("operator request".into());
        assert_eq!(
            exec.outcome(),
            Some(&WorkflowOutcome::Terminated {
                reason: "operator request".into()
            })
        );
        assert_eq!(exec.arena.live_count(), 0);
    }
}
