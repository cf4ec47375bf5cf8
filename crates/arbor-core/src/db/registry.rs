use crate::{
    db::scope::{ObjectHandle, ScopeId},
    error::InternalError,
    key::Key,
};
use std::collections::{BTreeSet, HashMap};

///
/// KeyRegistry
///
/// Per-scope side table from in-flight child objects to the ancestor key
/// their own key must embed when minted, plus the set of parent keys whose
/// denormalized relationship fields must be rewritten.
///
/// Children are keyed by arena handle, never by value: two pending objects
/// can be field-wise equal before their keys exist.
///

#[derive(Debug)]
pub struct KeyRegistry {
    scope: ScopeId,
    parents: HashMap<ObjectHandle, Key>,
    modified: BTreeSet<Key>,
}

impl KeyRegistry {
    pub(crate) fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            parents: HashMap::new(),
            modified: BTreeSet::new(),
        }
    }

    /// Record the ancestor key `child` must embed. Re-registering the same
    /// child replaces the previous entry.
    pub fn register_parent(
        &mut self,
        child: ObjectHandle,
        parent: Key,
    ) -> Result<(), InternalError> {
        if child.scope() != self.scope {
            return Err(InternalError::registry_invariant(format!(
                "object handle {child} belongs to scope {}, not {}",
                child.scope(),
                self.scope
            )));
        }
        if !parent.is_complete() {
            return Err(InternalError::registry_invariant(format!(
                "parent key {parent} is incomplete; write the parent before registering children"
            )));
        }

        if let Some(previous) = self.parents.insert(child, parent) {
            tracing::debug!(%child, %previous, "re-parented pending object");
        }

        Ok(())
    }

    /// Registered parent for `child`. Absent for unknown or foreign handles.
    #[must_use]
    pub fn parent(&self, child: ObjectHandle) -> Option<&Key> {
        self.parents.get(&child)
    }

    /// Consume the registered parent; the write path calls this when minting
    /// the child's key.
    pub fn take_parent(&mut self, child: ObjectHandle) -> Option<Key> {
        self.parents.remove(&child)
    }

    pub fn clear(&mut self) {
        self.parents.clear();
        self.modified.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.modified.is_empty()
    }

    // -----------------------------------------------------------------
    // Modified-parent side channel
    // -----------------------------------------------------------------

    pub fn mark_parent_modified(&mut self, parent: Key) {
        self.modified.insert(parent);
    }

    pub fn clear_parent_modified(&mut self, parent: &Key) {
        self.modified.remove(parent);
    }

    #[must_use]
    pub fn is_parent_modified(&self, parent: &Key) -> bool {
        self.modified.contains(parent)
    }

    /// Modified parents in key order.
    pub fn modified_parents(&self) -> impl Iterator<Item = &Key> {
        self.modified.iter()
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified.clear();
    }
}

///
/// TESTS
///
