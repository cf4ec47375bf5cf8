//! In-memory filter evaluation, ordering, and windowing.
//!
//! Filters use three-valued logic: a comparison against a missing or null
//! property is `Unknown`, and only rows whose filter is `True` pass.

use crate::{
    db::{
        query::{
            ast::{CompareOp, Direction, FieldExpr, Filter, Operand, OrderSpec},
            compile::{Parameters, QueryRange},
        },
        row::Row,
    },
    error::InternalError,
    value::{Value, canonical_cmp, strict_order_cmp, values_equal},
};
use std::{borrow::Cow, cmp::Ordering};

///
/// Tri
///
/// Kleene truth value.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tri {
    True,
    False,
    Unknown,
}

impl Tri {
    const fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }

    // Any-element semantics for multi-valued properties.
    fn any(results: impl IntoIterator<Item = Self>) -> Self {
        results.into_iter().fold(Self::False, Self::or)
    }
}

/// Resolve a field expression against a row. `None` means missing.
#[must_use]
pub(crate) fn resolve_field(row: &Row, field: &FieldExpr) -> Option<Value> {
    match field {
        FieldExpr::Property(name) => row.get(name).cloned(),
        FieldExpr::Key => Some(Value::Key(row.key().clone())),
        FieldExpr::Length(name) => match row.get(name)? {
            Value::Text(text) => Some(Value::Int(count_to_i64(text.chars().count()))),
            Value::List(items) => Some(Value::Int(count_to_i64(items.len()))),
            Value::Blob(bytes) => Some(Value::Int(count_to_i64(bytes.len()))),
            _ => None,
        },
        FieldExpr::Lowercase(name) => lowercase(row.get(name)?),
    }
}

fn lowercase(value: &Value) -> Option<Value> {
    match value {
        Value::Text(text) => Some(Value::Text(text.to_lowercase())),
        Value::List(items) => Some(Value::List(items.iter().filter_map(lowercase).collect())),
        _ => None,
    }
}

fn count_to_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Resolve an operand to a concrete value.
pub(crate) fn resolve_operand<'a>(
    operand: &'a Operand,
    params: &'a Parameters,
) -> Result<&'a Value, InternalError> {
    match operand {
        Operand::Value(value) => Ok(value),
        Operand::Param(name) => params.get(name).ok_or_else(|| {
            InternalError::query_malformed(format!("query parameter ':{name}' is not bound"))
        }),
    }
}

/// Compare a (possibly missing) property value against an operand.
///
/// `Eq`/`Ne` against a null operand are null tests; every other comparison
/// with a missing or null side is `Unknown`.
#[must_use]
pub(crate) fn compare_tri(actual: Option<&Value>, op: CompareOp, operand: &Value) -> Tri {
    let actual = actual.filter(|value| !value.is_null());

    if operand.is_null() {
        return match op {
            CompareOp::Eq => Tri::from_bool(actual.is_none()),
            CompareOp::Ne => Tri::from_bool(actual.is_some()),
            _ => Tri::Unknown,
        };
    }
    let Some(actual) = actual else {
        return Tri::Unknown;
    };

    match (actual, op) {
        (Value::List(items), CompareOp::Contains) => {
            Tri::from_bool(items.iter().any(|item| values_equal(item, operand)))
        }
        (Value::List(items), _) if items.is_empty() => Tri::Unknown,
        (Value::List(items), _) => {
            Tri::any(items.iter().map(|item| compare_tri(Some(item), op, operand)))
        }
        (scalar, _) => compare_scalar(scalar, op, operand),
    }
}

fn compare_scalar(actual: &Value, op: CompareOp, operand: &Value) -> Tri {
    match op {
        CompareOp::Eq => Tri::from_bool(values_equal(actual, operand)),
        CompareOp::Ne => Tri::from_bool(!values_equal(actual, operand)),
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            strict_order_cmp(actual, operand).map_or(Tri::Unknown, |ord| {
                Tri::from_bool(match op {
                    CompareOp::Lt => ord.is_lt(),
                    CompareOp::Lte => ord.is_le(),
                    CompareOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                })
            })
        }
        CompareOp::In => match operand {
            Value::List(candidates) => {
                Tri::from_bool(candidates.iter().any(|candidate| values_equal(actual, candidate)))
            }
            _ => Tri::Unknown,
        },
        CompareOp::StartsWith => match (actual, operand) {
            (Value::Text(text), Value::Text(prefix)) => Tri::from_bool(text.starts_with(prefix)),
            _ => Tri::Unknown,
        },
        CompareOp::Contains => match (actual, operand) {
            (Value::Text(text), Value::Text(needle)) => Tri::from_bool(text.contains(needle)),
            _ => Tri::Unknown,
        },
    }
}

/// Evaluate a filter tree against one row.
pub(crate) fn evaluate_filter(
    row: &Row,
    filter: &Filter,
    params: &Parameters,
) -> Result<Tri, InternalError> {
    Ok(match filter {
        Filter::And(children) => {
            let mut acc = Tri::True;
            for child in children {
                acc = acc.and(evaluate_filter(row, child, params)?);
            }
            acc
        }
        Filter::Or(children) => {
            let mut acc = Tri::False;
            for child in children {
                acc = acc.or(evaluate_filter(row, child, params)?);
            }
            acc
        }
        Filter::Not(inner) => evaluate_filter(row, inner, params)?.negate(),
        Filter::Compare(cmp) => {
            let operand = resolve_operand(&cmp.operand, params)?;
            let actual = resolve_field(row, &cmp.field);
            compare_tri(actual.as_ref(), cmp.op, operand)
        }
        Filter::IsNull(field) => {
            Tri::from_bool(resolve_field(row, field).is_none_or(|value| value.is_null()))
        }
        Filter::IsNotNull(field) => {
            Tri::from_bool(resolve_field(row, field).is_some_and(|value| !value.is_null()))
        }
        Filter::AncestorIs(operand) => match resolve_operand(operand, params)? {
            Value::Key(ancestor) => Tri::from_bool(row.key().is_descendant_or_self(ancestor)),
            other => {
                return Err(InternalError::query_malformed(format!(
                    "ancestor filter requires a key operand, found {other:?}"
                )));
            }
        },
        Filter::InSubquery { field, alias } => {
            let members = params.subquery(alias).ok_or_else(|| {
                InternalError::query_malformed(format!("subquery '{alias}' has no bound results"))
            })?;
            let actual = resolve_field(row, field);
            let operand = Value::List(members.to_vec());
            compare_tri(actual.as_ref(), CompareOp::In, &operand)
        }
    })
}

/// Filter, stably sort, and window candidate rows entirely in memory.
pub(crate) fn evaluate(
    rows: Vec<Row>,
    filter: Option<&Filter>,
    ordering: &[OrderSpec],
    range: QueryRange,
    params: &Parameters,
) -> Result<Vec<Row>, InternalError> {
    let mut matched = Vec::with_capacity(rows.len());
    for row in rows {
        let keep = match filter {
            Some(filter) => evaluate_filter(&row, filter, params)? == Tri::True,
            None => true,
        };
        if keep {
            matched.push(row);
        }
    }

    if !ordering.is_empty() {
        let mut keyed: Vec<(Vec<Value>, Row)> = matched
            .into_iter()
            .map(|row| {
                let sort_key = ordering
                    .iter()
                    .map(|spec| resolve_field(&row, &spec.field).unwrap_or(Value::Null))
                    .collect();
                (sort_key, row)
            })
            .collect();

        // Vec::sort_by is stable; ties keep candidate order
        keyed.sort_by(|(left, _), (right, _)| compare_sort_keys(left, right, ordering));
        matched = keyed.into_iter().map(|(_, row)| row).collect();
    }

    Ok(range.apply(matched))
}

fn compare_sort_keys(left: &[Value], right: &[Value], ordering: &[OrderSpec]) -> Ordering {
    for ((a, b), spec) in left.iter().zip(right).zip(ordering) {
        let ord = sort_cmp(a, b, spec.direction);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    Ordering::Equal
}

/// Sort comparator for one ordering key; missing values are passed as null.
pub(crate) fn sort_cmp(left: &Value, right: &Value, direction: Direction) -> Ordering {
    let ord = canonical_cmp(sortable(left).as_ref(), sortable(right).as_ref());
    match direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

// Multi-valued properties sort by their smallest element.
fn sortable(value: &Value) -> Cow<'_, Value> {
    match value {
        Value::List(items) => items
            .iter()
            .min_by(|a, b| canonical_cmp(a, b))
            .map_or(Cow::Owned(Value::Null), Cow::Borrowed),
        other => Cow::Borrowed(other),
    }
}
