use thiserror::Error as ThisError;

///
/// ResponseError
///
/// Result-shape violations detected after execution.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ResponseError {
    #[error("expected at most one '{kind}' row, found {count} or more")]
    NotUnique { kind: String, count: usize },
}

impl ResponseError {
    pub(crate) fn not_unique(kind: impl Into<String>, count: usize) -> Self {
        Self::NotUnique {
            kind: kind.into(),
            count,
        }
    }
}
