use crate::value::Value;
use std::cmp::Ordering;

/// Total canonical comparator used for sorting and value equality.
///
/// Ordering rules:
/// 1. Canonical family rank (null < bool < numeric < text < blob < key < list)
/// 2. Family-specific comparison for same-ranked values
///
/// `Int` and `Float` share the numeric family and compare numerically.
#[must_use]
pub fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    let rank = left.canonical_rank().cmp(&right.canonical_rank());
    if rank != Ordering::Equal {
        return rank;
    }

    #[allow(clippy::match_same_arms)]
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
        (Value::Key(a), Value::Key(b)) => a.cmp(b),
        (Value::List(a), Value::List(b)) => canonical_cmp_list(a, b),
        _ => numeric_cmp(left, right).unwrap_or(Ordering::Equal),
    }
}

/// Strict comparator for orderable values of the same family.
///
/// Returns `None` for nulls, lists, mismatched families, and NaN.
#[must_use]
pub fn strict_order_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
        (Value::Key(a), Value::Key(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            strict_numeric_cmp(left, right)
        }
        _ => None,
    }
}

/// Scalar equality under query semantics; mismatched families are unequal.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    strict_order_cmp(left, right).is_some_and(Ordering::is_eq)
}

// Total numeric order: NaN sorts after every number.
fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            Some(a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b)))
        }
    }
}

fn strict_numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => as_f64(left)?.partial_cmp(&as_f64(right)?),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

fn canonical_cmp_list(left: &[Value], right: &[Value]) -> Ordering {
    for (a, b) in left.iter().zip(right) {
        let ord = canonical_cmp(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}
