use crate::{
    db::{cascade::CascadeError, response::ResponseError, store::StoreError},
    key::KeyError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; the facade maps it onto the public error surface.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Construct a user-facing malformed-query error.
    pub(crate) fn query_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Malformed, ErrorOrigin::Query, message)
    }

    /// Construct a query-origin unsupported error.
    pub(crate) fn query_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Query, message)
    }

    /// Wrap a store failure raised while executing a query.
    pub(crate) fn query_execution(kind: &str, err: StoreError) -> Self {
        Self::new(
            ErrorClass::Execution,
            ErrorOrigin::Store,
            format!("query on kind '{kind}' failed: {err}"),
        )
        .with_detail(ErrorDetail::Store(err))
    }

    /// Wrap a store failure raised while a cursor was fetching rows.
    pub(crate) fn cursor_execution(kind: &str, err: StoreError) -> Self {
        Self::new(
            ErrorClass::Execution,
            ErrorOrigin::Cursor,
            format!("cursor fetch on kind '{kind}' failed: {err}"),
        )
        .with_detail(ErrorDetail::Store(err))
    }

    /// Construct a registry-origin invariant violation.
    pub(crate) fn registry_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Registry, message)
    }

    /// Construct a write-path invariant violation.
    pub(crate) fn write_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Write, message)
    }

    /// Wrap a store failure raised by the write path.
    pub(crate) fn write_store(context: impl fmt::Display, err: StoreError) -> Self {
        Self::new(
            ErrorClass::Execution,
            ErrorOrigin::Write,
            format!("{context}: {err}"),
        )
        .with_detail(ErrorDetail::Store(err))
    }

    /// Construct a model-origin configuration error.
    pub(crate) fn model_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Configuration, ErrorOrigin::Model, message)
    }

    /// Construct a cascade error from structured cascade detail.
    pub(crate) fn cascade(class: ErrorClass, err: CascadeError) -> Self {
        Self::new(class, ErrorOrigin::Cascade, err.to_string())
            .with_detail(ErrorDetail::Cascade(err))
    }

    /// True when the caller may retry the failed operation as a whole.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Execution)
    }

    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self.class, ErrorClass::Malformed)
    }

    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match &self.detail {
            Some(ErrorDetail::Store(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn cascade_error(&self) -> Option<&CascadeError> {
        match &self.detail {
            Some(ErrorDetail::Cascade(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<KeyError> for InternalError {
    fn from(err: KeyError) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Key, err.to_string())
            .with_detail(ErrorDetail::Key(err))
    }
}

impl From<ResponseError> for InternalError {
    fn from(err: ResponseError) -> Self {
        Self::new(ErrorClass::Conflict, ErrorOrigin::Query, err.to_string())
            .with_detail(ErrorDetail::Response(err))
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreError),
    #[error("{0}")]
    Cascade(CascadeError),
    #[error("{0}")]
    Response(ResponseError),
    #[error("{0}")]
    Key(KeyError),
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Caller supplied a query or graph the engine cannot interpret.
    Malformed,
    Unsupported,
    /// Store-side execution failure; the caller may retry the operation.
    Execution,
    Conflict,
    /// Cascade could not keep the object graph consistent.
    Integrity,
    Configuration,
    InvariantViolation,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Malformed => "malformed",
            Self::Unsupported => "unsupported",
            Self::Execution => "execution",
            Self::Conflict => "conflict",
            Self::Integrity => "integrity",
            Self::Configuration => "configuration",
            Self::InvariantViolation => "invariant_violation",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Key,
    Store,
    Query,
    Cursor,
    Registry,
    Write,
    Cascade,
    Model,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Key => "key",
            Self::Store => "store",
            Self::Query => "query",
            Self::Cursor => "cursor",
            Self::Registry => "registry",
            Self::Write => "write",
            Self::Cascade => "cascade",
            Self::Model => "model",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}
