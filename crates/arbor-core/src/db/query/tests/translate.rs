use super::{key, person};
use crate::{
    db::query::{
        CompareOp, Direction, ExecutionPreference, FieldExpr, Filter, NativeField, NativeFilter,
        NativeOp, NativeSort, OrderSpec, Parameters, QueryCompilation, QueryRange,
        QueryTranslator, RefusalReason, ScanDescriptor, Translation,
    },
    error::ErrorClass,
    obs::{metrics_report, metrics_reset_all},
    value::Value,
};

fn translate(compilation: &QueryCompilation) -> Translation {
    QueryTranslator::new()
        .translate(compilation, &Parameters::new())
        .expect("translation should not fail")
}

fn refusal(compilation: &QueryCompilation) -> Option<RefusalReason> {
    translate(compilation).refusal()
}

fn filter(field: &str, op: NativeOp, value: impl Into<Value>) -> NativeFilter {
    NativeFilter {
        field: NativeField::Property(field.to_string()),
        op,
        value: value.into(),
    }
}

fn sort(field: &str, direction: Direction) -> NativeSort {
    NativeSort {
        field: NativeField::Property(field.to_string()),
        direction,
    }
}

#[test]
fn range_filter_with_matching_sort_is_native() {
    let compilation = QueryCompilation::new("Person")
        .filter(Filter::gte("age", 25))
        .order_by(OrderSpec::asc("age"))
        .range(0, 10);

    let expected = ScanDescriptor {
        filters: vec![filter("age", NativeOp::Gte, 25)],
        sorts: vec![sort("age", Direction::Asc)],
        range: QueryRange::new(0, 10),
        ..ScanDescriptor::full_kind("Person")
    };

    assert_eq!(translate(&compilation), Translation::Native(expected));
}

#[test]
fn conjunction_flattens_and_pinned_sorts_may_lead() {
    let compilation = QueryCompilation::new("Person")
        .filter(Filter::and(vec![
            Filter::eq("city", "Oslo"),
            Filter::gt("age", 18) & Filter::lt("age", 65),
            Filter::in_("tier", vec![Value::from(1), Value::from(2)]),
        ]))
        .order_by(OrderSpec::asc("city"))
        .order_by(OrderSpec::desc("age"))
        .order_by(OrderSpec::asc("name"));

    let expected = ScanDescriptor {
        filters: vec![
            filter("city", NativeOp::Eq, "Oslo"),
            filter("age", NativeOp::Gt, 18),
            filter("age", NativeOp::Lt, 65),
            filter(
                "tier",
                NativeOp::In,
                Value::List(vec![Value::Int(1), Value::Int(2)]),
            ),
        ],
        sorts: vec![
            sort("city", Direction::Asc),
            sort("age", Direction::Desc),
            sort("name", Direction::Asc),
        ],
        ..ScanDescriptor::full_kind("Person")
    };

    assert_eq!(translate(&compilation), Translation::Native(expected));
}

#[test]
fn ancestor_and_key_filters_are_native() {
    let parent = key("Person", 7);
    let compilation = QueryCompilation::new("Pet")
        .filter(
            Filter::ancestor(parent.clone())
                & Filter::compare(FieldExpr::Key, CompareOp::Gt, Value::Key(parent.clone())),
        )
        .order_by(OrderSpec::asc(FieldExpr::Key));

    let Translation::Native(scan) = translate(&compilation) else {
        panic!("expected native translation");
    };
    assert_eq!(scan.ancestor, Some(parent));
    assert_eq!(scan.filters[0].field, NativeField::Key);
    assert_eq!(scan.sorts[0].field, NativeField::Key);
}

#[test]
fn parameters_are_resolved_into_the_descriptor() {
    let compilation =
        QueryCompilation::new("Person").filter(Filter::param("age", CompareOp::Lte, "max"));
    let params = Parameters::new().bind("max", 40);

    let translation = QueryTranslator::new()
        .translate(&compilation, &params)
        .expect("translation should succeed");

    let Translation::Native(scan) = translation else {
        panic!("expected native translation");
    };
    assert_eq!(scan.filters, vec![filter("age", NativeOp::Lte, 40)]);
}

#[test]
fn subquery_alias_always_refuses() {
    let params = Parameters::new().bind_subquery("friends", vec![Value::Int(1)]);
    let nested = Filter::gt("age", 1) & Filter::in_subquery("id", "friends");
    let compilation = QueryCompilation::new("Person").filter(nested);

    let translation = QueryTranslator::new()
        .translate(&compilation, &params)
        .expect("bound subquery is well-formed");

    assert_eq!(translation, Translation::Refused(RefusalReason::Subquery));
}

#[test]
fn non_conjunctive_filters_refuse() {
    let cases = [
        (
            Filter::eq("a", 1) | Filter::eq("b", 2),
            RefusalReason::Disjunction,
        ),
        (Filter::not(Filter::eq("a", 1)), RefusalReason::Negation),
        (Filter::is_null("a"), RefusalReason::NullTest),
        (Filter::eq("a", Value::Null), RefusalReason::NullTest),
        (
            Filter::compare("a", CompareOp::StartsWith, Value::from("x")),
            RefusalReason::UnsupportedOperator,
        ),
        (
            Filter::ne("a", 1),
            RefusalReason::UnsupportedOperator,
        ),
        (
            Filter::eq(FieldExpr::Length("name".to_string()), 3),
            RefusalReason::DerivedField,
        ),
    ];

    for (filter, reason) in cases {
        let compilation = QueryCompilation::new("Person").filter(filter.clone());
        assert_eq!(refusal(&compilation), Some(reason), "filter: {filter:?}");
    }
}

#[test]
fn inequality_constraints_refuse() {
    let two_properties = QueryCompilation::new("Person")
        .filter(Filter::gt("age", 1) & Filter::lt("height", 200));
    assert_eq!(
        refusal(&two_properties),
        Some(RefusalReason::MultipleInequalityProperties)
    );

    let two_lower = QueryCompilation::new("Person")
        .filter(Filter::gt("age", 1) & Filter::gte("age", 5));
    assert_eq!(refusal(&two_lower), Some(RefusalReason::ConflictingRange));

    let unsorted_inequality = QueryCompilation::new("Person")
        .filter(Filter::gt("age", 1))
        .order_by(OrderSpec::asc("name"));
    assert_eq!(
        refusal(&unsorted_inequality),
        Some(RefusalReason::SortIncompatible)
    );

    let derived_sort = QueryCompilation::new("Person")
        .order_by(OrderSpec::asc(FieldExpr::Lowercase("name".to_string())));
    assert_eq!(
        refusal(&derived_sort),
        Some(RefusalReason::SortOnDerivedField)
    );

    let two_ancestors = QueryCompilation::new("Pet")
        .filter(Filter::ancestor(key("Person", 1)) & Filter::ancestor(key("Person", 2)));
    assert_eq!(
        refusal(&two_ancestors),
        Some(RefusalReason::MultipleAncestors)
    );
}

#[test]
fn materialized_candidates_follow_preference() {
    let rows = vec![person(1, 30), person(2, 20)];
    let compilation = QueryCompilation::new("Person").collection(rows);

    assert_eq!(
        refusal(&compilation),
        Some(RefusalReason::CandidatesInMemory)
    );

    let native = compilation.prefer(ExecutionPreference::Native);
    let Translation::Native(scan) = translate(&native) else {
        panic!("native preference pushes candidates down");
    };
    assert_eq!(
        scan.filters,
        vec![NativeFilter {
            field: NativeField::Key,
            op: NativeOp::In,
            value: Value::List(vec![
                Value::Key(key("Person", 1)),
                Value::Key(key("Person", 2)),
            ]),
        }]
    );
}

#[test]
fn default_preference_applies_only_to_auto_queries() {
    let translator = QueryTranslator::with_default_preference(ExecutionPreference::InMemory);
    let params = Parameters::new();

    let auto = QueryCompilation::new("Person");
    let explicit = QueryCompilation::new("Person").prefer(ExecutionPreference::Native);

    assert_eq!(
        translator.translate(&auto, &params).expect("translate"),
        Translation::Refused(RefusalReason::ForcedInMemory)
    );
    assert!(
        translator
            .translate(&explicit, &params)
            .expect("translate")
            .is_native()
    );
}

#[test]
fn malformed_queries_fail_regardless_of_path() {
    let cases = [
        QueryCompilation::new(""),
        QueryCompilation::new("Person").filter(Filter::param("age", CompareOp::Eq, "unbound")),
        QueryCompilation::new("Person").filter(Filter::compare(
            "age",
            CompareOp::In,
            Value::Int(3),
        )),
        QueryCompilation::new("Person").filter(Filter::in_subquery("id", "missing")),
        QueryCompilation::new("Person").filter(Filter::eq("", 1)),
        QueryCompilation::new("Person").range(5, 2),
        QueryCompilation::new("Person")
            .prefer(ExecutionPreference::InMemory)
            .filter(Filter::AncestorIs(Value::Int(1).into())),
    ];

    for compilation in cases {
        let err = QueryTranslator::new()
            .translate(&compilation, &Parameters::new())
            .expect_err("malformed query must fail");
        assert_eq!(err.class, ErrorClass::Malformed, "{compilation:?}");
    }
}

#[test]
fn refusals_are_counted_by_reason() {
    metrics_reset_all();
    let compilation =
        QueryCompilation::new("Person").filter(Filter::eq("a", 1) | Filter::eq("a", 2));

    translate(&compilation);
    translate(&compilation);

    let counters = metrics_report(None).counters.expect("counters recorded");
    assert_eq!(counters.refusals.get("disjunction"), Some(&2));
}

#[test]
fn descriptor_serializes_to_json() {
    let scan = ScanDescriptor {
        filters: vec![filter("age", NativeOp::Gte, 25)],
        sorts: vec![sort("age", Direction::Desc)],
        range: QueryRange::new(2, 5),
        ..ScanDescriptor::under("Pet", key("Person", 1))
    };

    let json = serde_json::to_value(&scan).expect("serialize");
    assert_eq!(json["kind"], "Pet");
    assert_eq!(json["sorts"][0]["direction"], "desc");

    let back: ScanDescriptor = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, scan);
}
