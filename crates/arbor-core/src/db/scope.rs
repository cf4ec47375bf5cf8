//! Connection/transaction scopes.
//!
//! A scope is created at transaction begin and passed by reference through
//! the write, query, and delete paths. It owns the scope's KeyRegistry and
//! tracks the cursors it opened so lifecycle notifications can reach them.

use crate::db::{
    query::{CursorHandle, ResultCursor},
    registry::KeyRegistry,
};
use derive_more::Display;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

///
/// ScopeId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("#{_0}")]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

///
/// ObjectHandle
///
/// Identity of one in-flight object within a scope: an arena slot tagged
/// with the owning scope. Copyable, never compared by object value.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectHandle {
    scope: ScopeId,
    slot: u64,
}

impl ObjectHandle {
    #[must_use]
    pub const fn scope(self) -> ScopeId {
        self.scope
    }

    #[must_use]
    pub const fn slot(self) -> u64 {
        self.slot
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.slot)
    }
}

///
/// ScopeEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeEvent {
    /// Transaction is about to commit.
    TransactionPreCommit,
    /// Connection is about to be released.
    PreClose,
    /// Connection has been released.
    PostClose,
    /// Pending writes reached the store.
    Flushed,
}

///
/// ConnectionScope
///

#[derive(Debug)]
pub struct ConnectionScope {
    id: ScopeId,
    transactional: bool,
    next_slot: u64,
    registry: KeyRegistry,
    cursors: Vec<CursorHandle>,
    closed: bool,
}

impl ConnectionScope {
    /// Open a scope. Transactional scopes map onto one store transaction and
    /// are bounded by a single entity group.
    #[must_use]
    pub fn begin(transactional: bool) -> Self {
        let id = ScopeId::next();

        Self {
            id,
            transactional,
            next_slot: 0,
            registry: KeyRegistry::new(id),
            cursors: Vec::new(),
            closed: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ScopeId {
        self.id
    }

    #[must_use]
    pub const fn is_transactional(&self) -> bool {
        self.transactional
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Allocate a fresh identity for an in-flight object.
    pub const fn new_object(&mut self) -> ObjectHandle {
        let slot = self.next_slot;
        self.next_slot += 1;

        ObjectHandle {
            scope: self.id,
            slot,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub const fn registry_mut(&mut self) -> &mut KeyRegistry {
        &mut self.registry
    }

    /// Register a cursor for lifecycle notifications.
    pub(crate) fn track_cursor(&mut self, cursor: &ResultCursor) {
        self.cursors.retain(CursorHandle::is_live);
        self.cursors.push(cursor.handle());
    }

    /// Cursors opened by this scope that the caller still holds.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.cursors.iter().filter(|cursor| cursor.is_live()).count()
    }

    /// Deliver a lifecycle notification.
    pub fn notify(&mut self, event: ScopeEvent) {
        tracing::debug!(scope = %self.id, ?event, "scope lifecycle event");

        match event {
            ScopeEvent::TransactionPreCommit | ScopeEvent::PreClose => {
                for cursor in self.cursors.drain(..) {
                    cursor.disconnect();
                }
            }
            ScopeEvent::PostClose => {
                self.registry.clear();
                self.closed = true;
            }
            ScopeEvent::Flushed => self.registry.clear_modified(),
        }
    }

    /// Pre-close then post-close.
    pub fn close(&mut self) {
        self.notify(ScopeEvent::PreClose);
        self.notify(ScopeEvent::PostClose);
    }
}

///
/// TESTS
///
