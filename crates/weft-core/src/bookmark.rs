//! The bookmark manager: one resumption table per workflow instance.
//!
//! A bookmark decouples "waiting for an external event" from any call
//! stack. `create` returns a token bound to its owning instance and a
//! tagged callback; `resume` looks the token up and hands the callback
//! back for dispatch; `remove` invalidates without resuming. Named
//! bookmarks are optionally partitioned by a `BookmarkScope` so identical
//! names in different scopes never collide.
//!
//! Between creation and resumption the executor guarantees no other
//! mutation touches the owning instance (single-writer invariant), which
//! is what makes replay-after-deserialization safe.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use weft_types::bookmark::{
    Bookmark, BookmarkCallback, BookmarkError, BookmarkOptions, BookmarkScope,
};
use weft_types::instance::InstanceId;

// ---------------------------------------------------------------------------
// BookmarkRecord
// ---------------------------------------------------------------------------

/// One live bookmark registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmarkRecord {
    /// Tagged continuation to dispatch on resume.
    pub callback: BookmarkCallback,
    /// Creation options.
    pub options: BookmarkOptions,
    /// Optional name for external lookup.
    pub name: Option<String>,
    /// Scope partition for the name (default scope when `None`).
    pub scope: Option<BookmarkScope>,
}

// ---------------------------------------------------------------------------
// BookmarkManager
// ---------------------------------------------------------------------------

/// The resumption table.
///
/// Ids are allocated monotonically and never reused, so a stale token can
/// only miss (`NotFound`), never alias a newer bookmark.
#[derive(Debug, Default)]
pub struct BookmarkManager {
    next_id: u64,
    records: HashMap<Bookmark, BookmarkRecord>,
    names: HashMap<(Option<BookmarkScope>, String), Bookmark>,
    scopes: HashSet<BookmarkScope>,
}

impl BookmarkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an anonymous bookmark.
    pub fn create(&mut self, callback: BookmarkCallback, options: BookmarkOptions) -> Bookmark {
        self.next_id += 1;
        let bookmark = Bookmark(self.next_id);
        self.records.insert(
            bookmark,
            BookmarkRecord {
                callback,
                options,
                name: None,
                scope: None,
            },
        );
        tracing::debug!(%bookmark, "bookmark created");
        bookmark
    }

    /// Register a named bookmark, optionally under a scope.
    ///
    /// Fails when the name is already taken within the same scope or the
    /// scope handle was never created.
    pub fn create_named(
        &mut self,
        name: &str,
        scope: Option<BookmarkScope>,
        callback: BookmarkCallback,
        options: BookmarkOptions,
    ) -> Result<Bookmark, BookmarkError> {
        if let Some(s) = scope {
            if !self.scopes.contains(&s) {
                return Err(BookmarkError::UnknownScope(s));
            }
        }
        let key = (scope, name.to_string());
        if self.names.contains_key(&key) {
            return Err(BookmarkError::NameConflict {
                name: name.to_string(),
            });
        }
        self.next_id += 1;
        let bookmark = Bookmark(self.next_id);
        self.records.insert(
            bookmark,
            BookmarkRecord {
                callback,
                options,
                name: Some(name.to_string()),
                scope,
            },
        );
        self.names.insert(key, bookmark);
        tracing::debug!(%bookmark, name, "named bookmark created");
        Ok(bookmark)
    }

    /// Allocate a new scope partition.
    pub fn create_scope(&mut self) -> BookmarkScope {
        let scope = BookmarkScope(Uuid::new_v4());
        self.scopes.insert(scope);
        scope
    }

    /// Look up a named bookmark within a scope.
    pub fn find_by_name(&self, name: &str, scope: Option<BookmarkScope>) -> Option<Bookmark> {
        self.names.get(&(scope, name.to_string())).copied()
    }

    /// Resolve a bookmark for resumption.
    ///
    /// Returns the record (callback + options); the bookmark is removed
    /// from the table unless it was created with `multiple_resume`. An
    /// unknown or already-removed token yields `None` -- never a panic.
    pub fn resume(&mut self, bookmark: Bookmark) -> Option<BookmarkRecord> {
        let multiple = self
            .records
            .get(&bookmark)
            .map(|r| r.options.multiple_resume)?;
        if multiple {
            self.records.get(&bookmark).cloned()
        } else {
            self.take(bookmark)
        }
    }

    /// Invalidate a bookmark without resuming it.
    pub fn remove(&mut self, bookmark: Bookmark) -> Option<BookmarkRecord> {
        self.take(bookmark)
    }

    /// Drop every bookmark owned by `owner` (instance teardown).
    pub fn remove_owned_by(&mut self, owner: InstanceId) -> Vec<Bookmark> {
        let owned: Vec<Bookmark> = self
            .records
            .iter()
            .filter(|(_, r)| r.callback.target == owner)
            .map(|(b, _)| *b)
            .collect();
        for bookmark in &owned {
            self.take(*bookmark);
        }
        owned
    }

    /// Peek at a record without consuming it.
    pub fn get(&self, bookmark: Bookmark) -> Option<&BookmarkRecord> {
        self.records.get(&bookmark)
    }

    /// Number of live bookmarks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all registrations (instance termination).
    pub fn clear(&mut self) {
        self.records.clear();
        self.names.clear();
    }

    /// Serializable view of the table, for diagnostics snapshots.
    pub fn snapshot(&self) -> Value {
        let entries: Vec<Value> = self
            .records
            .iter()
            .map(|(b, r)| {
                serde_json::json!({
                    "bookmark": b.0,
                    "owner": r.callback.target,
                    "kind": r.callback.kind,
                    "name": r.name,
                })
            })
            .collect();
        Value::Array(entries)
    }

    fn take(&mut self, bookmark: Bookmark) -> Option<BookmarkRecord> {
        let record = self.records.remove(&bookmark)?;
        if let Some(name) = &record.name {
            self.names.remove(&(record.scope, name.clone()));
        }
        Some(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
