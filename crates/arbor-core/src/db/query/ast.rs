use crate::{key::Key, value::Value};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Filter AST
///
/// Parsed, schema-agnostic query filter. Interpretation happens later:
///
/// - translation (native executability)
/// - in-memory evaluation
///

///
/// FieldExpr
///
/// Left-hand side of a comparison. `Length` and `Lowercase` are derived
/// values computed from a stored property; the store cannot index them.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldExpr {
    Property(String),
    Key,
    Length(String),
    Lowercase(String),
}

impl FieldExpr {
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    #[must_use]
    pub const fn is_derived(&self) -> bool {
        matches!(self, Self::Length(_) | Self::Lowercase(_))
    }

    /// Name of the underlying stored property, if any.
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        match self {
            Self::Property(name) | Self::Length(name) | Self::Lowercase(name) => Some(name),
            Self::Key => None,
        }
    }
}

impl From<&str> for FieldExpr {
    fn from(name: &str) -> Self {
        Self::Property(name.to_string())
    }
}

impl From<String> for FieldExpr {
    fn from(name: String) -> Self {
        Self::Property(name)
    }
}

impl fmt::Display for FieldExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => f.write_str(name),
            Self::Key => f.write_str("__key__"),
            Self::Length(name) => write!(f, "len({name})"),
            Self::Lowercase(name) => write!(f, "lower({name})"),
        }
    }
}

///
/// Operand
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Value(Value),
    /// Named parameter bound at execution time.
    Param(String),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    StartsWith,
    Contains,
}

impl CompareOp {
    #[must_use]
    pub const fn is_range(self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "in",
            Self::StartsWith => "starts_with",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// Comparison
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comparison {
    pub field: FieldExpr,
    pub op: CompareOp,
    pub operand: Operand,
}

///
/// Filter
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter {
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(Comparison),
    IsNull(FieldExpr),
    IsNotNull(FieldExpr),
    /// Row key equals or descends from the operand key.
    AncestorIs(Operand),
    /// Field value is a member of a pre-evaluated subquery result set.
    InSubquery {
        field: FieldExpr,
        alias: String,
    },
}

impl Filter {
    #[must_use]
    pub const fn and(filters: Vec<Self>) -> Self {
        Self::And(filters)
    }

    #[must_use]
    pub const fn or(filters: Vec<Self>) -> Self {
        Self::Or(filters)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(filter: Self) -> Self {
        Self::Not(Box::new(filter))
    }

    #[must_use]
    pub fn compare(
        field: impl Into<FieldExpr>,
        op: CompareOp,
        operand: impl Into<Operand>,
    ) -> Self {
        Self::Compare(Comparison {
            field: field.into(),
            op,
            operand: operand.into(),
        })
    }

    /// Compare against a named parameter.
    #[must_use]
    pub fn param(field: impl Into<FieldExpr>, op: CompareOp, name: impl Into<String>) -> Self {
        Self::compare(field, op, Operand::Param(name.into()))
    }

    #[must_use]
    pub fn eq(field: impl Into<FieldExpr>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn ne(field: impl Into<FieldExpr>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn lt(field: impl Into<FieldExpr>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn lte(field: impl Into<FieldExpr>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn gt(field: impl Into<FieldExpr>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn gte(field: impl Into<FieldExpr>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn in_(field: impl Into<FieldExpr>, values: Vec<Value>) -> Self {
        Self::compare(field, CompareOp::In, Value::List(values))
    }

    #[must_use]
    pub fn is_null(field: impl Into<FieldExpr>) -> Self {
        Self::IsNull(field.into())
    }

    #[must_use]
    pub fn is_not_null(field: impl Into<FieldExpr>) -> Self {
        Self::IsNotNull(field.into())
    }

    #[must_use]
    pub fn ancestor(key: Key) -> Self {
        Self::AncestorIs(Operand::Value(Value::Key(key)))
    }

    #[must_use]
    pub fn in_subquery(field: impl Into<FieldExpr>, alias: impl Into<String>) -> Self {
        Self::InSubquery {
            field: field.into(),
            alias: alias.into(),
        }
    }

    /// Alias of the first subquery reference anywhere in the tree.
    #[must_use]
    pub fn contains_subquery(&self) -> Option<&str> {
        match self {
            Self::InSubquery { alias, .. } => Some(alias),
            Self::And(children) | Self::Or(children) => {
                children.iter().find_map(Self::contains_subquery)
            }
            Self::Not(inner) => inner.contains_subquery(),
            Self::Compare(_) | Self::IsNull(_) | Self::IsNotNull(_) | Self::AncestorIs(_) => None,
        }
    }
}

impl std::ops::BitAnd for Filter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![self, rhs])
    }
}

impl std::ops::BitOr for Filter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

///
/// OrderSpec
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderSpec {
    pub field: FieldExpr,
    pub direction: Direction,
}

impl OrderSpec {
    #[must_use]
    pub fn asc(field: impl Into<FieldExpr>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<FieldExpr>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}
