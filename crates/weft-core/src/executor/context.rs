//! `ActivityContext`: the only handle activity code gets on the engine.
//!
//! Scoped to one instance for the duration of one callback. Everything an
//! activity can do -- schedule children, create and resume bookmarks,
//! touch properties, reach extensions -- goes through here, which is what
//! keeps the executor single-writer.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use weft_types::bookmark::{
    Bookmark, BookmarkCallback, BookmarkError, BookmarkOptions, BookmarkResumeStatus,
    BookmarkScope,
};
use weft_types::event::EngineEvent;
use weft_types::fault::WorkflowFault;
use weft_types::instance::InstanceId;

use crate::activity::Activity;
use crate::extension::WorkflowExtension;

use super::Executor;

pub struct ActivityContext<'a> {
    exec: &'a mut Executor,
    current: InstanceId,
}

impl<'a> ActivityContext<'a> {
    pub(crate) fn new(exec: &'a mut Executor, current: InstanceId) -> Self {
        Self { exec, current }
    }

    /// Handle of the instance this context is scoped to.
    pub fn current(&self) -> InstanceId {
        self.current
    }

    pub fn workflow_id(&self) -> Uuid {
        self.exec.workflow_id()
    }

    /// Input value this instance was scheduled with.
    pub fn argument(&self) -> Option<&Value> {
        self.exec
            .arena
            .get(self.current)
            .and_then(|n| n.argument.as_ref())
    }

    /// Record the result reported to the parent at completion.
    pub fn set_result(&mut self, value: Value) {
        if let Some(node) = self.exec.arena.get_mut(self.current) {
            node.result = Some(value);
        }
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Schedule a child activity under the current instance.
    pub fn schedule_activity(
        &mut self,
        activity: Arc<dyn Activity>,
        completion_tag: Option<u32>,
        fault_tag: Option<u32>,
    ) -> InstanceId {
        self.exec.schedule(
            activity,
            Some(self.current),
            completion_tag,
            fault_tag,
            None,
            false,
        )
    }

    /// Schedule a child activity with an input argument.
    pub fn schedule_action(
        &mut self,
        activity: Arc<dyn Activity>,
        argument: Value,
        completion_tag: u32,
        fault_tag: Option<u32>,
    ) -> InstanceId {
        self.exec.schedule(
            activity,
            Some(self.current),
            Some(completion_tag),
            fault_tag,
            Some(argument),
            false,
        )
    }

    /// Schedule a parentless tree that runs alongside the main root. The
    /// workflow does not complete until it settles.
    pub fn schedule_secondary_root(&mut self, activity: Arc<dyn Activity>) -> InstanceId {
        self.exec.schedule(activity, None, None, None, None, true)
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel one known child. Pierces its shield.
    pub fn cancel_child(&mut self, child: InstanceId) {
        self.exec.request_cancel(child, true);
    }

    /// Cancel all unfinished children. Shielded children are skipped.
    pub fn cancel_children(&mut self) {
        let children = self
            .exec
            .arena
            .get(self.current)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            self.exec.request_cancel(child, false);
        }
    }

    /// Acknowledge a pending cancellation: the instance settles `Canceled`
    /// once quiet. Calling this without a cancellation request is a usage
    /// fault.
    pub fn mark_canceled(&mut self) -> Result<(), WorkflowFault> {
        let Some(node) = self.exec.arena.get_mut(self.current) else {
            return Ok(());
        };
        if !node.cancel_requested {
            return Err(WorkflowFault::usage(
                "mark_canceled called without a cancellation request",
            ));
        }
        node.marked_canceled = true;
        Ok(())
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.exec
            .arena
            .get(self.current)
            .is_some_and(|n| n.cancel_requested)
    }

    /// Protect a child from blanket child cancellation (fault teardown and
    /// targeted cancels still reach it).
    pub fn shield_child(&mut self, child: InstanceId) {
        if let Some(node) = self.exec.arena.get_mut(child) {
            node.shielded = true;
        }
    }

    pub fn unshield_child(&mut self, child: InstanceId) {
        if let Some(node) = self.exec.arena.get_mut(child) {
            node.shielded = false;
        }
    }

    // -----------------------------------------------------------------------
    // Bookmarks
    // -----------------------------------------------------------------------

    /// Create an anonymous bookmark owned by this instance.
    pub fn create_bookmark(
        &mut self,
        kind: u32,
        payload: Option<Value>,
        options: BookmarkOptions,
    ) -> Bookmark {
        let callback = BookmarkCallback {
            target: self.current,
            kind,
            payload,
        };
        self.exec.register_bookmark(callback, options)
    }

    /// Create a named bookmark, resumable from the host by name.
    pub fn create_named_bookmark(
        &mut self,
        name: &str,
        scope: Option<BookmarkScope>,
        kind: u32,
        payload: Option<Value>,
        options: BookmarkOptions,
    ) -> Result<Bookmark, BookmarkError> {
        let callback = BookmarkCallback {
            target: self.current,
            kind,
            payload,
        };
        let bookmark = self
            .exec
            .bookmarks
            .create_named(name, scope, callback, options)?;
        if !options.non_blocking {
            if let Some(node) = self.exec.arena.get_mut(self.current) {
                node.blocking_bookmarks += 1;
            }
        }
        Ok(bookmark)
    }

    pub fn create_bookmark_scope(&mut self) -> BookmarkScope {
        self.exec.bookmarks.create_scope()
    }

    /// Invalidate a bookmark without resuming it.
    pub fn remove_bookmark(&mut self, bookmark: Bookmark) {
        self.exec.unregister_bookmark(bookmark);
    }

    /// Resume any bookmark in this workflow from inside activity code.
    /// Used by the protocol machinery to signal across subtrees.
    pub fn resume_bookmark(&mut self, bookmark: Bookmark, value: Value) -> BookmarkResumeStatus {
        self.exec.resume_bookmark(bookmark, value)
    }

    // -----------------------------------------------------------------------
    // Persistence pause
    // -----------------------------------------------------------------------

    /// Ask the host for a persistence point at the next safe boundary.
    pub fn request_persist(&mut self) {
        self.exec.request_persist();
    }

    /// Open a no-persist block; pauses are deferred until it closes.
    pub fn enter_no_persist(&mut self) {
        self.exec.enter_no_persist();
    }

    pub fn exit_no_persist(&mut self) {
        self.exec.exit_no_persist();
    }

    // -----------------------------------------------------------------------
    // Extensions
    // -----------------------------------------------------------------------

    pub fn get_extension<T: WorkflowExtension>(&self) -> Option<Arc<T>> {
        self.exec.extensions.get::<T>()
    }

    pub fn get_or_add_extension_with<T, F>(&mut self, make: F) -> Arc<T>
    where
        T: WorkflowExtension,
        F: FnOnce() -> Arc<T>,
    {
        self.exec.extensions.get_or_add_with(make)
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    /// Read a property, walking ancestor frames (nearest frame wins).
    pub fn get_property(&self, key: &str) -> Option<Value> {
        self.exec.arena.lookup_property(self.current, key).cloned()
    }

    /// Write a property into this instance's own frame, shadowing any
    /// ancestor value.
    pub fn set_property(&mut self, key: &str, value: Value) {
        if let Some(node) = self.exec.arena.get_mut(self.current) {
            node.properties
                .get_or_insert_with(HashMap::new)
                .insert(key.to_string(), value);
        }
    }

    /// Remove a property from this instance's own frame only.
    pub fn remove_property(&mut self, key: &str) {
        if let Some(node) = self.exec.arena.get_mut(self.current) {
            if let Some(frame) = &mut node.properties {
                frame.remove(key);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Misc
    // -----------------------------------------------------------------------

    /// Whether this instance runs inside a secondary-root tree.
    pub fn in_secondary_root_subtree(&self) -> bool {
        self.exec.arena.in_secondary_root_subtree(self.current)
    }

    pub fn publish(&self, event: EngineEvent) {
        self.exec.events().publish(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
