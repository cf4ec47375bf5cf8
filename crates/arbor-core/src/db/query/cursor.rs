use crate::{
    db::{row::Row, store::StoreCursor},
    error::InternalError,
    obs::sink::{self, MetricsEvent},
};
use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

///
/// CursorState
///
/// Shared between the caller-facing cursor and the owning scope, which may
/// disconnect it on pre-commit or pre-close.
///

pub(crate) struct CursorState {
    kind: String,
    source: Option<Box<dyn StoreCursor>>,
    buffer: VecDeque<Row>,
    batch_size: usize,
    pending_error: Option<InternalError>,
    disconnected: bool,
}

impl CursorState {
    // Fetch the next batch into the buffer. Returns false when exhausted.
    fn fill(&mut self) -> Result<bool, InternalError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };

        match source.next_batch(self.batch_size) {
            Ok(batch) if batch.is_empty() => {
                self.source = None;
                Ok(false)
            }
            Ok(batch) => {
                self.buffer.extend(batch);
                Ok(true)
            }
            Err(err) => {
                self.source = None;
                Err(InternalError::cursor_execution(&self.kind, err))
            }
        }
    }

    /// Drain the store cursor into the local buffer and drop it.
    /// A fetch failure is deferred until the buffered rows are consumed.
    pub(crate) fn disconnect(&mut self) -> usize {
        if self.disconnected {
            return self.buffer.len();
        }

        let before = self.buffer.len();
        loop {
            match self.fill() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    self.pending_error = Some(err);
                    break;
                }
            }
        }
        self.disconnected = true;

        let fetched = self.buffer.len() - before;
        sink::record(MetricsEvent::CursorDisconnected {
            rows_buffered: u64::try_from(fetched).unwrap_or(u64::MAX),
        });
        tracing::debug!(kind = %self.kind, rows = fetched, "cursor disconnected from store");

        self.buffer.len()
    }
}

///
/// ResultCursor
///
/// Lazy, forward-only iterator over native query results, fetched from the
/// store in batches.
///

pub struct ResultCursor {
    state: Rc<RefCell<CursorState>>,
}

impl ResultCursor {
    pub(crate) fn new(kind: &str, source: Box<dyn StoreCursor>, batch_size: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(CursorState {
                kind: kind.to_string(),
                source: Some(source),
                buffer: VecDeque::new(),
                batch_size: batch_size.max(1),
                pending_error: None,
                disconnected: false,
            })),
        }
    }

    pub(crate) fn handle(&self) -> CursorHandle {
        CursorHandle(Rc::downgrade(&self.state))
    }

    /// Detach from the store, buffering every remaining row locally.
    /// Returns the number of rows now held in the buffer.
    pub fn disconnect(&self) -> usize {
        self.state.borrow_mut().disconnect()
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.state.borrow().disconnected
    }

    /// Rows fetched but not yet yielded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.borrow().buffer.len()
    }
}

impl Iterator for ResultCursor {
    type Item = Result<Row, InternalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.state.borrow_mut();
        loop {
            if let Some(row) = state.buffer.pop_front() {
                return Some(Ok(row));
            }
            if let Some(err) = state.pending_error.take() {
                return Some(Err(err));
            }
            match state.fill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ResultCursor")
            .field("kind", &state.kind)
            .field("buffered", &state.buffer.len())
            .field("disconnected", &state.disconnected)
            .finish_non_exhaustive()
    }
}

///
/// CursorHandle
///
/// Weak reference held by the scope; dead once the caller drops the cursor.
///

#[derive(Clone, Debug)]
pub(crate) struct CursorHandle(Weak<RefCell<CursorState>>);

impl CursorHandle {
    pub(crate) fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Disconnect the cursor if it is still alive.
    pub(crate) fn disconnect(&self) -> Option<usize> {
        let state = self.0.upgrade()?;
        let buffered = state.borrow_mut().disconnect();

        Some(buffered)
    }
}
