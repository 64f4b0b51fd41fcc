//! Arena of activity instances.
//!
//! The workflow tree is stored as a flat slot vector; all parent/child
//! edges are integer handles into it. Slots are never reused: a removed
//! instance leaves a tombstone, so a stale handle can only miss, never
//! alias a newer instance.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use weft_types::fault::FaultContext;
use weft_types::instance::{ActivityInstanceState, InstanceId};

use crate::activity::Activity;

// ---------------------------------------------------------------------------
// ActivityInstance
// ---------------------------------------------------------------------------

/// One node of the live workflow tree.
pub struct ActivityInstance {
    pub id: InstanceId,
    /// The (immutable, shared) activity definition this node executes.
    pub activity: Arc<dyn Activity>,
    /// Display name captured at schedule time.
    pub name: String,
    pub parent: Option<InstanceId>,
    /// Live children, in schedule order.
    pub children: Vec<InstanceId>,
    pub state: ActivityInstanceState,
    /// Parent's dispatch tag for normal completion, if it asked for one.
    pub completion_tag: Option<u32>,
    /// Parent's dispatch tag for fault interception, if it asked for one.
    pub fault_tag: Option<u32>,
    /// Input handed to `execute`.
    pub argument: Option<Value>,
    /// Output reported at completion.
    pub result: Option<Value>,
    /// Property frame. Lazily allocated; lookups walk ancestor frames.
    pub properties: Option<HashMap<String, Value>>,
    /// Live bookmarks that count as blocking work.
    pub blocking_bookmarks: u32,
    /// Work items queued against this instance and not yet dispatched.
    pub pending_items: u32,
    /// `execute` has run (or was skipped by an early cancel).
    pub executed: bool,
    pub cancel_requested: bool,
    /// Shielded from blanket child cancellation (fault/cancel handlers).
    pub shielded: bool,
    /// Activity acknowledged the cancel; settle as Canceled.
    pub marked_canceled: bool,
    /// First fault observed while this instance winds down. First wins.
    pub pending_fault: Option<FaultContext>,
    /// Root of a parallel tree scheduled outside the main root.
    pub secondary_root: bool,
}

impl ActivityInstance {
    /// Whether this node is quiet: executed, no live children, no queued
    /// work. Blocking bookmarks are checked separately since faulting and
    /// canceling instances abandon them.
    pub fn is_quiet(&self) -> bool {
        self.executed && self.children.is_empty() && self.pending_items == 0
    }
}

impl std::fmt::Debug for ActivityInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("children", &self.children)
            .field("blocking_bookmarks", &self.blocking_bookmarks)
            .field("pending_items", &self.pending_items)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InstanceArena
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InstanceArena {
    slots: Vec<Option<ActivityInstance>>,
}

impl InstanceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh instance for `activity` under `parent`.
    pub fn allocate(
        &mut self,
        activity: Arc<dyn Activity>,
        parent: Option<InstanceId>,
        completion_tag: Option<u32>,
        fault_tag: Option<u32>,
        argument: Option<Value>,
    ) -> InstanceId {
        let id = InstanceId(self.slots.len() as u32);
        let name = activity.display_name().to_string();
        self.slots.push(Some(ActivityInstance {
            id,
            activity,
            name,
            parent,
            children: Vec::new(),
            state: ActivityInstanceState::Executing,
            completion_tag,
            fault_tag,
            argument,
            result: None,
            properties: None,
            blocking_bookmarks: 0,
            pending_items: 0,
            executed: false,
            cancel_requested: false,
            shielded: false,
            marked_canceled: false,
            pending_fault: None,
            secondary_root: false,
        }));
        if let Some(p) = parent {
            if let Some(parent_node) = self.get_mut(p) {
                parent_node.children.push(id);
            }
        }
        id
    }

    pub fn get(&self, id: InstanceId) -> Option<&ActivityInstance> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut ActivityInstance> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    /// Tear down a slot, detaching it from its parent's child list.
    pub fn remove(&mut self, id: InstanceId) -> Option<ActivityInstance> {
        let node = self.slots.get_mut(id.0 as usize)?.take()?;
        if let Some(p) = node.parent {
            if let Some(parent_node) = self.get_mut(p) {
                parent_node.children.retain(|&c| c != id);
            }
        }
        Some(node)
    }

    /// Walk `id` and its ancestors; returns the first property frame
    /// holding `key`, the way environment scoping resolves variables.
    pub fn lookup_property(&self, id: InstanceId, key: &str) -> Option<&Value> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.get(current)?;
            if let Some(frame) = &node.properties {
                if let Some(value) = frame.get(key) {
                    return Some(value);
                }
            }
            cursor = node.parent;
        }
        None
    }

    /// Whether `id` or any of its ancestors is a secondary-root node.
    pub fn in_secondary_root_subtree(&self, id: InstanceId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.get(current) {
                Some(node) if node.secondary_root => return true,
                Some(node) => cursor = node.parent,
                None => return false,
            }
        }
        false
    }

    /// Ids of all live instances, in allocation order.
    pub fn live_ids(&self) -> Vec<InstanceId> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|n| n.id))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::context::ActivityContext;
    use weft_types::fault::WorkflowFault;

    struct Stub;

    impl Activity for Stub {
        fn display_name(&self) -> &str {
            "stub"
        }

        fn execute(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
            Ok(())
        }
    }

    fn stub() -> Arc<dyn Activity> {
        Arc::new(Stub)
    }

    #[test]
    fn handles_are_never_reused() {
        let mut arena = InstanceArena::new();
        let a = arena.allocate(stub(), None, None, None, None);
        arena.remove(a);
        let b = arena.allocate(stub(), None, None, None, None);
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
    }

    #[test]
    fn remove_detaches_from_parent() {
        let mut arena = InstanceArena::new();
        let root = arena.allocate(stub(), None, None, None, None);
        let child = arena.allocate(stub(), Some(root), Some(1), None, None);
        assert_eq!(arena.get(root).unwrap().children, vec![child]);

        arena.remove(child);
        assert!(arena.get(root).unwrap().children.is_empty());
    }

    #[test]
    fn property_lookup_walks_ancestors() {
        let mut arena = InstanceArena::new();
        let root = arena.allocate(stub(), None, None, None, None);
        let mid = arena.allocate(stub(), Some(root), None, None, None);
        let leaf = arena.allocate(stub(), Some(mid), None, None, None);

        arena
            .get_mut(root)
            .unwrap()
            .properties
            .get_or_insert_with(HashMap::new)
            .insert("k".into(), serde_json::json!("root"));
        arena
            .get_mut(mid)
            .unwrap()
            .properties
            .get_or_insert_with(HashMap::new)
            .insert("k".into(), serde_json::json!("mid"));

        // Nearest frame wins.
        assert_eq!(
            arena.lookup_property(leaf, "k"),
            Some(&serde_json::json!("mid"))
        );
        assert_eq!(
            arena.lookup_property(root, "k"),
            Some(&serde_json::json!("root"))
        );
        assert!(arena.lookup_property(leaf, "missing").is_none());
    }

    #[test]
    fn secondary_root_subtree_detection() {
        let mut arena = InstanceArena::new();
        let root = arena.allocate(stub(), None, None, None, None);
        let side = arena.allocate(stub(), None, None, None, None);
        arena.get_mut(side).unwrap().secondary_root = true;
        let inner = arena.allocate(stub(), Some(side), None, None, None);

        assert!(!arena.in_secondary_root_subtree(root));
        assert!(arena.in_secondary_root_subtree(side));
        assert!(arena.in_secondary_root_subtree(inner));
    }
}
