//! Delete cascades over dependent and non-owner relationships.
//!
//! A cascade is staged in full before anything is written: dependent
//! children (deepest first), then back-references to null. Integrity and
//! policy failures therefore never leave a partial cascade behind.

mod execute;
mod plan;

#[cfg(test)]
mod tests;

use crate::{db::store::StoreError, key::Key};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

pub use execute::DependentDeleteCascader;
pub use plan::{CascadePlan, FieldStrategy};

///
/// CascadeError
///
/// Structured cascade failure, carried as detail on `InternalError`.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CascadeError {
    #[error(
        "cannot null non-nullable back-reference '{related_kind}.{mapped_by}' while deleting {owner} (field '{field}')"
    )]
    NonNullableBackReference {
        owner: String,
        field: String,
        related_kind: String,
        mapped_by: String,
    },

    #[error("field '{class}.{field}' maps by '{mapped_by}', which '{target}' does not declare")]
    MissingMapping {
        class: String,
        field: String,
        target: String,
        mapped_by: String,
    },

    #[error("join relationship '{class}.{field}' on {owner} has no cascade behavior")]
    JoinRelationUnsupported {
        owner: String,
        class: String,
        field: String,
    },

    #[error("cascade from {owner} would touch {related} outside its entity group")]
    CrossEntityGroup { owner: String, related: String },

    #[error("store write failed while cascading {owner} (field '{field}'): {source}")]
    StoreWrite {
        owner: String,
        field: String,
        source: StoreError,
    },
}

///
/// RowState
///
/// Live in-memory state of the row being deleted: relationship fields whose
/// related keys are already loaded. Loaded keys take precedence over the
/// store when resolving children.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RowState {
    loaded: BTreeMap<String, Vec<Key>>,
}

impl RowState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_loaded(mut self, field: impl Into<String>, keys: Vec<Key>) -> Self {
        self.loaded.insert(field.into(), keys);
        self
    }

    #[must_use]
    pub fn loaded(&self, field: &str) -> Option<&[Key]> {
        self.loaded.get(field).map(Vec::as_slice)
    }
}

///
/// CascadeReport
///
/// Mutations applied by one cascade, in application order.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CascadeReport {
    pub deleted: Vec<Key>,
    pub nulled: Vec<Key>,
}

impl CascadeReport {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.nulled.is_empty()
    }
}
