use crate::{
    db::{
        query::ast::{Filter, OrderSpec},
        row::Row,
    },
    error::InternalError,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// ExecutionPreference
///
/// Caller override for the native/in-memory decision. `Auto` defers to the
/// translator's rules.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPreference {
    #[default]
    Auto,
    InMemory,
    Native,
}

///
/// QueryRange
///
/// Half-open result window `[from, to)`. `to = None` is unbounded.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct QueryRange {
    pub from: usize,
    pub to: Option<usize>,
}

impl QueryRange {
    #[must_use]
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to: Some(to) }
    }

    #[must_use]
    pub const fn all() -> Self {
        Self { from: 0, to: None }
    }

    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.from == 0 && self.to.is_none()
    }

    /// Number of rows the window admits, if bounded.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.to.map(|to| to.saturating_sub(self.from))
    }

    pub(crate) fn validate(&self) -> Result<(), InternalError> {
        match self.to {
            Some(to) if to < self.from => Err(InternalError::query_malformed(format!(
                "invalid query range [{}, {to}): upper bound precedes lower bound",
                self.from
            ))),
            _ => Ok(()),
        }
    }

    /// Apply the window to an already ordered sequence.
    pub(crate) fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.from);
        match self.limit() {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

///
/// Extent
///
/// Full-kind candidate extent. `rows` is populated when the extent has
/// already been materialized in memory.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Extent {
    pub rows: Option<Vec<Row>>,
}

///
/// CandidateSource
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CandidateSource {
    /// Fresh full-kind scan.
    #[default]
    Scan,
    Extent(Extent),
    /// Caller-supplied in-memory candidates.
    Collection(Vec<Row>),
}

impl CandidateSource {
    /// Candidate rows already held in memory, if any.
    #[must_use]
    pub fn materialized(&self) -> Option<&[Row]> {
        match self {
            Self::Collection(rows) => Some(rows),
            Self::Extent(Extent { rows: Some(rows) }) => Some(rows),
            Self::Scan | Self::Extent(Extent { rows: None }) => None,
        }
    }
}

///
/// QueryCompilation
///
/// Parsed query handed over by the persistence API: candidate kind and source,
/// filter tree, ordering, and result window.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryCompilation {
    pub kind: String,
    pub candidates: CandidateSource,
    pub filter: Option<Filter>,
    pub ordering: Vec<OrderSpec>,
    pub range: QueryRange,
    pub unique: bool,
    pub preference: ExecutionPreference,
}

impl QueryCompilation {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            candidates: CandidateSource::Scan,
            filter: None,
            ordering: Vec::new(),
            range: QueryRange::all(),
            unique: false,
            preference: ExecutionPreference::Auto,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.ordering.push(order);
        self
    }

    #[must_use]
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.range = QueryRange::new(from, to);
        self
    }

    #[must_use]
    pub fn offset(mut self, from: usize) -> Self {
        self.range.from = from;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn candidates(mut self, candidates: CandidateSource) -> Self {
        self.candidates = candidates;
        self
    }

    #[must_use]
    pub fn collection(self, rows: Vec<Row>) -> Self {
        self.candidates(CandidateSource::Collection(rows))
    }

    #[must_use]
    pub fn prefer(mut self, preference: ExecutionPreference) -> Self {
        self.preference = preference;
        self
    }
}

///
/// Parameters
///
/// Named parameter bindings plus pre-evaluated subquery result sets.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Parameters {
    named: BTreeMap<String, Value>,
    subqueries: BTreeMap<String, Vec<Value>>,
}

impl Parameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn bind_subquery(mut self, alias: impl Into<String>, values: Vec<Value>) -> Self {
        self.subqueries.insert(alias.into(), values);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    #[must_use]
    pub fn subquery(&self, alias: &str) -> Option<&[Value]> {
        self.subqueries.get(alias).map(Vec::as_slice)
    }
}
