use arbor_core::{
    db::{cascade::CascadeError, response::ResponseError, store::StoreError},
    error::{ErrorClass, ErrorDetail, ErrorOrigin as CoreErrorOrigin, InternalError},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// Store-side failures: the caller may retry the whole operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Store(_))
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::Malformed => ErrorKind::Query(QueryErrorKind::Invalid),
            ErrorClass::Unsupported => match err.cascade_error() {
                Some(_) => ErrorKind::Cascade(CascadeErrorKind::Unsupported),
                None => ErrorKind::Query(QueryErrorKind::Unsupported),
            },
            ErrorClass::Conflict => match &err.detail {
                Some(ErrorDetail::Response(ResponseError::NotUnique { .. })) => {
                    ErrorKind::Query(QueryErrorKind::NotUnique)
                }
                _ => ErrorKind::Store(StoreErrorKind::Conflict),
            },
            ErrorClass::Execution => ErrorKind::Store(store_kind(&err)),
            ErrorClass::Integrity => ErrorKind::Cascade(CascadeErrorKind::Integrity),
            ErrorClass::Configuration => ErrorKind::Configuration,
            ErrorClass::InvariantViolation | ErrorClass::Internal => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

fn store_kind(err: &InternalError) -> StoreErrorKind {
    let source = match &err.detail {
        Some(ErrorDetail::Store(source)) => Some(source),
        Some(ErrorDetail::Cascade(CascadeError::StoreWrite { source, .. })) => Some(source),
        _ => None,
    };

    match source {
        Some(StoreError::Rejected { .. }) => StoreErrorKind::Rejected,
        Some(StoreError::Conflict { .. }) => StoreErrorKind::Conflict,
        Some(StoreError::NotFound { .. }) => StoreErrorKind::NotFound,
        Some(StoreError::Timeout { .. } | StoreError::Unavailable { .. }) | None => {
            StoreErrorKind::Unavailable
        }
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Query(QueryErrorKind),
    Store(StoreErrorKind),
    Cascade(CascadeErrorKind),

    /// Engine or model configuration is invalid.
    Configuration,

    /// The caller cannot remediate this.
    Internal,
}

///
/// QueryErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// Query shape is invalid (unbound parameters, bad ranges, bad operands).
    Invalid,

    /// The query is valid but cannot run under the current limits.
    Unsupported,

    /// Query expected one row but matched many.
    NotUnique,
}

///
/// StoreErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    Unavailable,
    Rejected,
    Conflict,
    NotFound,
}

///
/// CascadeErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CascadeErrorKind {
    /// A back-reference could not be cleared; nothing was written.
    Integrity,

    /// The cascade needs behavior the engine does not define.
    Unsupported,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
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

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Key => Self::Key,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Cursor => Self::Cursor,
            CoreErrorOrigin::Registry => Self::Registry,
            CoreErrorOrigin::Write => Self::Write,
            CoreErrorOrigin::Cascade => Self::Cascade,
            CoreErrorOrigin::Model => Self::Model,
            CoreErrorOrigin::Config => Self::Config,
        }
    }
}
