//! Native-executability decision for compiled queries.
//!
//! The store evaluates a restricted operator and sort subset. The translator
//! either emits a `ScanDescriptor` the store can run as-is, or refuses with a
//! reason so the planner falls back to in-memory evaluation. Refusal is not
//! an error; only malformed queries fail.

use crate::{
    db::query::{
        ast::{CompareOp, FieldExpr, Filter, Operand, OrderSpec},
        compile::{ExecutionPreference, Parameters, QueryCompilation},
        descriptor::{NativeField, NativeFilter, NativeOp, NativeSort, ScanDescriptor},
        eval::resolve_operand,
    },
    error::InternalError,
    key::Key,
    obs::sink::{self, MetricsEvent},
    value::Value,
};
use std::fmt;

///
/// RefusalReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefusalReason {
    /// Candidates were supplied as an in-memory collection.
    CandidatesInMemory,
    ForcedInMemory,
    Subquery,
    Disjunction,
    Negation,
    UnsupportedOperator,
    DerivedField,
    NullTest,
    MultipleInequalityProperties,
    /// More than one lower or upper bound on the inequality property.
    ConflictingRange,
    MultipleAncestors,
    SortOnDerivedField,
    /// The inequality property is not the first remaining sort key.
    SortIncompatible,
}

impl RefusalReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CandidatesInMemory => "candidates_in_memory",
            Self::ForcedInMemory => "forced_in_memory",
            Self::Subquery => "subquery",
            Self::Disjunction => "disjunction",
            Self::Negation => "negation",
            Self::UnsupportedOperator => "unsupported_operator",
            Self::DerivedField => "derived_field",
            Self::NullTest => "null_test",
            Self::MultipleInequalityProperties => "multiple_inequality_properties",
            Self::ConflictingRange => "conflicting_range",
            Self::MultipleAncestors => "multiple_ancestors",
            Self::SortOnDerivedField => "sort_on_derived_field",
            Self::SortIncompatible => "sort_incompatible",
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// Translation
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Translation {
    Native(ScanDescriptor),
    Refused(RefusalReason),
}

impl Translation {
    #[must_use]
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Native(_))
    }

    #[must_use]
    pub const fn refusal(&self) -> Option<RefusalReason> {
        match self {
            Self::Refused(reason) => Some(*reason),
            Self::Native(_) => None,
        }
    }
}

///
/// QueryTranslator
///

#[derive(Clone, Copy, Debug, Default)]
pub struct QueryTranslator {
    /// Applied to compilations whose own preference is `Auto`.
    default_preference: ExecutionPreference,
}

impl QueryTranslator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default_preference: ExecutionPreference::Auto,
        }
    }

    #[must_use]
    pub const fn with_default_preference(preference: ExecutionPreference) -> Self {
        Self {
            default_preference: preference,
        }
    }

    const fn effective_preference(&self, compilation: &QueryCompilation) -> ExecutionPreference {
        match compilation.preference {
            ExecutionPreference::Auto => self.default_preference,
            explicit => explicit,
        }
    }

    /// Decide native executability. Malformed queries fail regardless of
    /// the eventual execution path.
    pub fn translate(
        &self,
        compilation: &QueryCompilation,
        params: &Parameters,
    ) -> Result<Translation, InternalError> {
        validate(compilation, params)?;

        let preference = self.effective_preference(compilation);
        match build_descriptor(compilation, preference, params) {
            Ok(scan) => Ok(Translation::Native(scan)),
            Err(reason) => {
                tracing::debug!(
                    kind = %compilation.kind,
                    reason = reason.label(),
                    "query not natively executable; evaluating in memory"
                );
                sink::record(MetricsEvent::TranslationRefused {
                    kind: &compilation.kind,
                    reason,
                });

                Ok(Translation::Refused(reason))
            }
        }
    }
}

// ---------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------

fn validate(compilation: &QueryCompilation, params: &Parameters) -> Result<(), InternalError> {
    if compilation.kind.is_empty() {
        return Err(InternalError::query_malformed("query kind must be non-empty"));
    }
    compilation.range.validate()?;

    if let Some(filter) = &compilation.filter {
        validate_filter(filter, params)?;
    }
    for spec in &compilation.ordering {
        validate_field(&spec.field)?;
    }

    Ok(())
}

fn validate_filter(filter: &Filter, params: &Parameters) -> Result<(), InternalError> {
    match filter {
        Filter::And(children) | Filter::Or(children) => children
            .iter()
            .try_for_each(|child| validate_filter(child, params)),
        Filter::Not(inner) => validate_filter(inner, params),
        Filter::Compare(cmp) => {
            validate_field(&cmp.field)?;
            let operand = resolve_operand(&cmp.operand, params)?;
            if cmp.op == CompareOp::In && operand.as_list().is_none() {
                return Err(InternalError::query_malformed(format!(
                    "'in' comparison on '{}' requires a list operand",
                    cmp.field
                )));
            }
            Ok(())
        }
        Filter::IsNull(field) | Filter::IsNotNull(field) => validate_field(field),
        Filter::AncestorIs(operand) => resolve_ancestor(operand, params).map(|_| ()),
        Filter::InSubquery { field, alias } => {
            validate_field(field)?;
            if params.subquery(alias).is_none() {
                return Err(InternalError::query_malformed(format!(
                    "subquery '{alias}' has no bound results"
                )));
            }
            Ok(())
        }
    }
}

fn validate_field(field: &FieldExpr) -> Result<(), InternalError> {
    match field.property_name() {
        Some("") => Err(InternalError::query_malformed("field name must be non-empty")),
        _ => Ok(()),
    }
}

fn resolve_ancestor<'a>(
    operand: &'a Operand,
    params: &'a Parameters,
) -> Result<&'a Key, InternalError> {
    match resolve_operand(operand, params)? {
        Value::Key(key) if key.is_complete() => Ok(key),
        Value::Key(key) => Err(InternalError::query_malformed(format!(
            "ancestor filter key {key} is incomplete"
        ))),
        other => Err(InternalError::query_malformed(format!(
            "ancestor filter requires a key operand, found {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------
// Descriptor construction
// ---------------------------------------------------------------------

fn build_descriptor(
    compilation: &QueryCompilation,
    preference: ExecutionPreference,
    params: &Parameters,
) -> Result<ScanDescriptor, RefusalReason> {
    if preference == ExecutionPreference::InMemory {
        return Err(RefusalReason::ForcedInMemory);
    }

    let mut scan = ScanDescriptor::full_kind(compilation.kind.clone());

    if let Some(rows) = compilation.candidates.materialized() {
        if preference != ExecutionPreference::Native {
            return Err(RefusalReason::CandidatesInMemory);
        }
        let keys = rows
            .iter()
            .map(|row| Value::Key(row.key().clone()))
            .collect();
        scan.filters.push(NativeFilter {
            field: NativeField::Key,
            op: NativeOp::In,
            value: Value::List(keys),
        });
    }

    if let Some(filter) = &compilation.filter {
        if filter.contains_subquery().is_some() {
            return Err(RefusalReason::Subquery);
        }

        let mut leaves = Vec::new();
        flatten_conjunction(filter, &mut leaves)?;
        for leaf in leaves {
            push_leaf(&mut scan, leaf, params)?;
        }
        check_inequalities(&scan.filters)?;
    }

    scan.sorts = native_sorts(&compilation.ordering, &scan.filters)?;
    scan.range = compilation.range;

    Ok(scan)
}

fn flatten_conjunction<'a>(
    filter: &'a Filter,
    leaves: &mut Vec<&'a Filter>,
) -> Result<(), RefusalReason> {
    match filter {
        Filter::And(children) => children
            .iter()
            .try_for_each(|child| flatten_conjunction(child, leaves)),
        Filter::Or(_) => Err(RefusalReason::Disjunction),
        Filter::Not(_) => Err(RefusalReason::Negation),
        Filter::IsNull(_) | Filter::IsNotNull(_) => Err(RefusalReason::NullTest),
        Filter::InSubquery { .. } => Err(RefusalReason::Subquery),
        Filter::Compare(_) | Filter::AncestorIs(_) => {
            leaves.push(filter);
            Ok(())
        }
    }
}

fn push_leaf(
    scan: &mut ScanDescriptor,
    leaf: &Filter,
    params: &Parameters,
) -> Result<(), RefusalReason> {
    match leaf {
        Filter::AncestorIs(operand) => {
            // validated up front
            let Ok(ancestor) = resolve_ancestor(operand, params) else {
                return Err(RefusalReason::UnsupportedOperator);
            };
            match &scan.ancestor {
                Some(existing) if existing != ancestor => Err(RefusalReason::MultipleAncestors),
                _ => {
                    scan.ancestor = Some(ancestor.clone());
                    Ok(())
                }
            }
        }
        Filter::Compare(cmp) => {
            let field = native_field(&cmp.field).ok_or(RefusalReason::DerivedField)?;
            let op = NativeOp::from_compare(cmp.op).ok_or(RefusalReason::UnsupportedOperator)?;
            let Ok(value) = resolve_operand(&cmp.operand, params) else {
                return Err(RefusalReason::UnsupportedOperator);
            };
            let null_in_list = value
                .as_list()
                .is_some_and(|items| items.iter().any(Value::is_null));
            if value.is_null() || null_in_list {
                return Err(RefusalReason::NullTest);
            }
            if op != NativeOp::In && value.as_list().is_some() {
                return Err(RefusalReason::UnsupportedOperator);
            }

            scan.filters.push(NativeFilter {
                field,
                op,
                value: value.clone(),
            });
            Ok(())
        }
        _ => Err(RefusalReason::UnsupportedOperator),
    }
}

fn native_field(field: &FieldExpr) -> Option<NativeField> {
    match field {
        FieldExpr::Property(name) => Some(NativeField::Property(name.clone())),
        FieldExpr::Key => Some(NativeField::Key),
        FieldExpr::Length(_) | FieldExpr::Lowercase(_) => None,
    }
}

// One inequality property, with at most one lower and one upper bound.
fn check_inequalities(filters: &[NativeFilter]) -> Result<(), RefusalReason> {
    let mut property: Option<&NativeField> = None;
    let (mut lower, mut upper) = (0_usize, 0_usize);

    for filter in filters.iter().filter(|filter| filter.op.is_inequality()) {
        match property {
            Some(existing) if existing != &filter.field => {
                return Err(RefusalReason::MultipleInequalityProperties);
            }
            _ => property = Some(&filter.field),
        }
        if filter.op.is_lower_bound() {
            lower += 1;
        } else {
            upper += 1;
        }
    }

    if lower > 1 || upper > 1 {
        return Err(RefusalReason::ConflictingRange);
    }

    Ok(())
}

fn inequality_field(filters: &[NativeFilter]) -> Option<&NativeField> {
    filters
        .iter()
        .find(|filter| filter.op.is_inequality())
        .map(|filter| &filter.field)
}

fn native_sorts(
    ordering: &[OrderSpec],
    filters: &[NativeFilter],
) -> Result<Vec<NativeSort>, RefusalReason> {
    let mut sorts = Vec::with_capacity(ordering.len());
    for spec in ordering {
        let field = native_field(&spec.field).ok_or(RefusalReason::SortOnDerivedField)?;
        sorts.push(NativeSort {
            field,
            direction: spec.direction,
        });
    }

    // equality-pinned keys may lead but are kept; list properties match `Eq`
    // on any element
    let leading = sorts.iter().find(|sort| {
        !filters
            .iter()
            .any(|filter| filter.op == NativeOp::Eq && filter.field == sort.field)
    });
    if let (Some(inequality), Some(first)) = (inequality_field(filters), leading)
        && &first.field != inequality
    {
        return Err(RefusalReason::SortIncompatible);
    }

    Ok(sorts)
}
