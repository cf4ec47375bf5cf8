//! Store client contract.
//!
//! The wire client for the underlying store lives outside this crate. It is
//! consumed through `StoreClient` (CRUD plus a native filtered/sorted scan)
//! and `StoreCursor` (batched forward-only result fetch).

mod memory;

use crate::{
    db::{query::ScanDescriptor, row::Row},
    key::Key,
};
use thiserror::Error as ThisError;

pub use memory::{FaultOp, MemoryStore, MemoryStoreStats, StoreOp};

///
/// StoreError
///
/// Failure reported by the store client. Kinds are preserved when wrapped.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error("store operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("store rejected native query: {message}")]
    Rejected { message: String },

    #[error("store write conflict: {message}")]
    Conflict { message: String },

    #[error("row not found: {key}")]
    NotFound { key: String },
}

impl StoreError {
    /// Transient failures may succeed when the whole operation is retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unavailable { .. } | Self::Conflict { .. }
        )
    }
}

///
/// StoreCursor
///
/// Store-side cursor over native query results.
///

pub trait StoreCursor {
    /// Fetch up to `limit` further rows. An empty batch means exhausted.
    fn next_batch(&mut self, limit: usize) -> Result<Vec<Row>, StoreError>;
}

///
/// StoreClient
///

pub trait StoreClient {
    fn get(&self, key: &Key) -> Result<Option<Row>, StoreError>;

    /// Write a row, minting an id when its key is incomplete. Returns the
    /// complete key the row was stored under.
    fn put(&mut self, row: Row) -> Result<Key, StoreError>;

    fn delete(&mut self, key: &Key) -> Result<(), StoreError>;

    fn run_native_query(&self, scan: &ScanDescriptor) -> Result<Box<dyn StoreCursor>, StoreError>;
}

/// Drain a store cursor completely.
pub(crate) fn drain_cursor(
    cursor: &mut dyn StoreCursor,
    batch_size: usize,
) -> Result<Vec<Row>, StoreError> {
    let mut rows = Vec::new();
    loop {
        let batch = cursor.next_batch(batch_size)?;
        if batch.is_empty() {
            return Ok(rows);
        }
        rows.extend(batch);
    }
}
