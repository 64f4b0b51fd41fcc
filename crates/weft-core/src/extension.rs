//! Workflow extensions: host services owned by one workflow instance.
//!
//! Extensions are registered on the instance before first run and looked
//! up by activities at execution time via `TypeId`. There is no global
//! registry; two instances with the same extension type hold independent
//! extension objects. An extension may additionally:
//!
//! - receive an [`InstanceProxy`] to resume bookmarks from outside the
//!   scheduler (e.g. a timer firing),
//! - participate in snapshots as a [`PersistenceParticipant`],
//! - react to the root activity settling, scheduling follow-up work as a
//!   secondary root (the compensation extension does exactly this).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use weft_types::instance::CompletionState;

use crate::activity::Activity;
use crate::host::InstanceProxy;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Instance-scoped host service.
pub trait WorkflowExtension: Send + Sync + 'static {
    /// Called once when the extension is attached, handing it a proxy to
    /// its owning instance. Extensions that never call back in ignore it.
    fn set_instance(&self, _proxy: InstanceProxy) {}

    /// Extra extensions this one requires. Attached (if not already
    /// present) when this extension is registered.
    fn additional_extensions(&self) -> Vec<ExtensionHandle> {
        Vec::new()
    }

    /// Snapshot participation, if any.
    fn as_persistence_participant(&self) -> Option<&dyn PersistenceParticipant> {
        None
    }

    /// Called exactly once when the root activity reaches a terminal
    /// state. Returning an activity schedules it as a secondary root; the
    /// workflow does not complete until it settles.
    fn root_settled(&self, _outcome: CompletionState) -> Option<Arc<dyn Activity>> {
        None
    }
}

/// An extension that persists state across a snapshot/restore cycle.
pub trait PersistenceParticipant: Send + Sync {
    /// Values to save: `(read_write, write_only)`. Read-write values are
    /// handed back through `publish_values` on restore; write-only values
    /// are diagnostics only.
    fn collect_values(&self) -> (HashMap<String, Value>, HashMap<String, Value>);

    /// Restore previously collected read-write values.
    fn publish_values(&self, values: &HashMap<String, Value>) -> Result<(), PersistenceError>;

    /// Snapshot window opens. Mutating registrations must fail until
    /// `end_snapshot`.
    fn begin_snapshot(&self) {}

    /// Snapshot window closes.
    fn end_snapshot(&self) {}
}

/// Errors raised while collecting or restoring participant state.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("malformed persisted value under key '{key}': {reason}")]
    MalformedValue { key: String, reason: String },

    #[error("missing persisted value under key '{key}'")]
    MissingValue { key: String },
}

// ---------------------------------------------------------------------------
// ExtensionHandle
// ---------------------------------------------------------------------------

/// Type-erased extension, retaining both trait views of one object.
///
/// `Arc<dyn WorkflowExtension>` alone cannot be downcast back to the
/// concrete type, so the handle carries a parallel `Arc<dyn Any>` to the
/// same allocation.
#[derive(Clone)]
pub struct ExtensionHandle {
    any: Arc<dyn Any + Send + Sync>,
    ext: Arc<dyn WorkflowExtension>,
    type_id: TypeId,
}

impl ExtensionHandle {
    pub fn new<T: WorkflowExtension>(extension: Arc<T>) -> Self {
        Self {
            any: extension.clone(),
            ext: extension,
            type_id: TypeId::of::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn extension(&self) -> &Arc<dyn WorkflowExtension> {
        &self.ext
    }

    pub fn downcast<T: WorkflowExtension>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }
}

impl std::fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("type_id", &self.type_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ExtensionRegistry
// ---------------------------------------------------------------------------

/// The per-instance extension table.
///
/// Insertion order is preserved; snapshot collection and root-settled
/// fan-out walk extensions in registration order.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    by_type: HashMap<TypeId, usize>,
    ordered: Vec<ExtensionHandle>,
    proxy: Option<InstanceProxy>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the instance proxy. Extensions registered before this point
    /// receive it now; later registrations receive it on add.
    pub fn set_proxy(&mut self, proxy: InstanceProxy) {
        for handle in &self.ordered {
            handle.extension().set_instance(proxy.clone());
        }
        self.proxy = Some(proxy);
    }

    /// Register an extension. A second registration of the same type is a
    /// no-op returning the existing instance.
    pub fn add<T: WorkflowExtension>(&mut self, extension: Arc<T>) -> Arc<T> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        self.attach(ExtensionHandle::new(extension.clone()));
        extension
    }

    /// Look up an extension by type.
    pub fn get<T: WorkflowExtension>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|&idx| self.ordered[idx].downcast::<T>())
    }

    /// Look up an extension by type, constructing and registering it when
    /// absent.
    pub fn get_or_add_with<T, F>(&mut self, make: F) -> Arc<T>
    where
        T: WorkflowExtension,
        F: FnOnce() -> Arc<T>,
    {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        self.add(make())
    }

    /// All extensions, in registration order.
    pub fn list(&self) -> &[ExtensionHandle] {
        &self.ordered
    }

    fn attach(&mut self, handle: ExtensionHandle) {
        if self.by_type.contains_key(&handle.type_id()) {
            return;
        }
        if let Some(proxy) = &self.proxy {
            handle.extension().set_instance(proxy.clone());
        }
        let required = handle.extension().additional_extensions();
        self.by_type.insert(handle.type_id(), self.ordered.len());
        self.ordered.push(handle);
        for extra in required {
            self.attach(extra);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counter {
        hits: AtomicU32,
    }

    impl WorkflowExtension for Counter {}

    impl Counter {
        fn bump(&self) -> u32 {
            self.hits.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    struct Dependent;

    impl WorkflowExtension for Dependent {
        fn additional_extensions(&self) -> Vec<ExtensionHandle> {
            vec![ExtensionHandle::new(Arc::new(Counter::default()))]
        }
    }

    #[test]
    fn add_then_get_returns_same_instance() {
        let mut reg = ExtensionRegistry::new();
        let counter = reg.add(Arc::new(Counter::default()));
        counter.bump();

        let again = reg.get::<Counter>().unwrap();
        assert_eq!(again.bump(), 2);
    }

    #[test]
    fn second_add_of_same_type_is_a_noop() {
        let mut reg = ExtensionRegistry::new();
        let first = reg.add(Arc::new(Counter::default()));
        first.bump();
        let second = reg.add(Arc::new(Counter::default()));
        assert_eq!(second.bump(), 2);
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn additional_extensions_are_attached() {
        let mut reg = ExtensionRegistry::new();
        reg.add(Arc::new(Dependent));
        assert!(reg.get::<Counter>().is_some());
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn get_or_add_with_constructs_once() {
        let mut reg = ExtensionRegistry::new();
        let a = reg.get_or_add_with(|| Arc::new(Counter::default()));
        a.bump();
        let b = reg.get_or_add_with(|| Arc::new(Counter::default()));
        assert_eq!(b.bump(), 2);
    }
}
