use crate::{
    db::{
        query::{
            ast::{CompareOp, Direction},
            compile::QueryRange,
            eval::{Tri, compare_tri},
        },
        row::Row,
    },
    key::Key,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// ScanDescriptor
///
/// Native query handed to the store: kind, optional ancestor, conjunctive
/// filters, sorts, and result window. Built only by the translator.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScanDescriptor {
    pub kind: String,
    pub ancestor: Option<Key>,
    pub filters: Vec<NativeFilter>,
    pub sorts: Vec<NativeSort>,
    pub range: QueryRange,
}

impl ScanDescriptor {
    /// Unfiltered, unsorted scan of every row of `kind`.
    #[must_use]
    pub fn full_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestor: None,
            filters: Vec::new(),
            sorts: Vec::new(),
            range: QueryRange::all(),
        }
    }

    /// Direct and indirect descendants of `ancestor`, ancestor included.
    #[must_use]
    pub fn under(kind: impl Into<String>, ancestor: Key) -> Self {
        Self {
            ancestor: Some(ancestor),
            ..Self::full_kind(kind)
        }
    }

    /// True when a row satisfies the kind, ancestor, and every filter.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        row.kind() == self.kind
            && self
                .ancestor
                .as_ref()
                .is_none_or(|ancestor| row.key().is_descendant_or_self(ancestor))
            && self.filters.iter().all(|filter| filter.matches(row))
    }
}

///
/// NativeField
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeField {
    Property(String),
    Key,
}

impl NativeField {
    /// Field value on a row. The key field always resolves.
    #[must_use]
    pub fn resolve(&self, row: &Row) -> Option<Value> {
        match self {
            Self::Property(name) => row.get(name).cloned(),
            Self::Key => Some(Value::Key(row.key().clone())),
        }
    }
}

impl fmt::Display for NativeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => f.write_str(name),
            Self::Key => f.write_str("__key__"),
        }
    }
}

///
/// NativeOp
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl NativeOp {
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }

    #[must_use]
    pub const fn is_lower_bound(self) -> bool {
        matches!(self, Self::Gt | Self::Gte)
    }

    #[must_use]
    pub const fn is_upper_bound(self) -> bool {
        matches!(self, Self::Lt | Self::Lte)
    }

    pub(crate) const fn from_compare(op: CompareOp) -> Option<Self> {
        match op {
            CompareOp::Eq => Some(Self::Eq),
            CompareOp::Lt => Some(Self::Lt),
            CompareOp::Lte => Some(Self::Lte),
            CompareOp::Gt => Some(Self::Gt),
            CompareOp::Gte => Some(Self::Gte),
            CompareOp::In => Some(Self::In),
            CompareOp::Ne | CompareOp::StartsWith | CompareOp::Contains => None,
        }
    }

    pub(crate) const fn as_compare(self) -> CompareOp {
        match self {
            Self::Eq => CompareOp::Eq,
            Self::Lt => CompareOp::Lt,
            Self::Lte => CompareOp::Lte,
            Self::Gt => CompareOp::Gt,
            Self::Gte => CompareOp::Gte,
            Self::In => CompareOp::In,
        }
    }
}

///
/// NativeFilter
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NativeFilter {
    pub field: NativeField,
    pub op: NativeOp,
    pub value: Value,
}

impl NativeFilter {
    /// Evaluate with the same comparison rules as in-memory evaluation.
    /// Rows missing the property never match.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let actual = self.field.resolve(row);
        compare_tri(actual.as_ref(), self.op.as_compare(), &self.value) == Tri::True
    }
}

///
/// NativeSort
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NativeSort {
    pub field: NativeField,
    pub direction: Direction,
}
