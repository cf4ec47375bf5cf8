use super::*;
use crate::{
    config::{CascadeConfig, CrossGroupPolicy, JoinRelationPolicy},
    db::{
        row::Row,
        scope::ConnectionScope,
        store::{FaultOp, MemoryStore, StoreOp},
    },
    error::ErrorClass,
    model::{ClassModel, FieldModel, ModelRegistry, RelationModel},
    obs::{metrics_report, metrics_reset_all},
    value::Value,
};
use std::rc::Rc;

///
/// Fixture
///
/// Owner(1) -> a: A(10), dependent, key held on the owner
///          -> b: B under Owner(1), owned + dependent; B(1) owns Leaf(1)
///          -> c: C(30), non-owner side, C.owner points back
///

struct Fixture {
    store: MemoryStore,
    owner: Row,
    a: Key,
    b1: Key,
    b2: Key,
    leaf: Key,
    c: Key,
    stray: Key,
}

fn models(back_reference_nullable: bool) -> ModelRegistry {
    let back_reference = FieldModel::relation("owner", RelationModel::one_to_one("Owner"));
    let back_reference = if back_reference_nullable {
        back_reference
    } else {
        back_reference.required()
    };

    ModelRegistry::new()
        .with(
            ClassModel::new("Owner")
                .field(FieldModel::property("name"))
                .field(FieldModel::relation(
                    "a",
                    RelationModel::one_to_one("A").dependent(),
                ))
                .field(FieldModel::relation(
                    "b",
                    RelationModel::one_to_many("B").owned().dependent(),
                ))
                .field(FieldModel::relation(
                    "c",
                    RelationModel::one_to_one("C").mapped_by("owner"),
                )),
        )
        .with(ClassModel::new("A"))
        .with(ClassModel::new("B").field(FieldModel::relation(
            "leaves",
            RelationModel::one_to_many("Leaf").owned().dependent(),
        )))
        .with(ClassModel::new("Leaf"))
        .with(ClassModel::new("C").field(back_reference))
}

fn key(kind: &str, id: u64) -> Key {
    Key::new(kind, id).expect("valid key")
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let owner_key = key("Owner", 1);
    let a = key("A", 10);
    let b1 = owner_key.child("B", 1_u64).expect("valid key");
    let b2 = owner_key.child("B", 2_u64).expect("valid key");
    let leaf = b1.child("Leaf", 1_u64).expect("valid key");
    let c = key("C", 30);
    let stray = key("Owner", 2).child("B", 3_u64).expect("valid key");

    let owner = Row::new(owner_key.clone()).with("a", a.clone());
    store.seed(owner.clone());
    store.seed(Row::new(a.clone()));
    store.seed(Row::new(b1.clone()));
    store.seed(Row::new(b2.clone()));
    store.seed(Row::new(leaf.clone()));
    store.seed(Row::new(c.clone()).with("owner", owner_key));
    store.seed(Row::new(stray.clone()));

    Fixture {
        store,
        owner,
        a,
        b1,
        b2,
        leaf,
        c,
        stray,
    }
}

fn mutations(store: &MemoryStore) -> Vec<StoreOp> {
    store
        .ops()
        .into_iter()
        .filter(|op| !matches!(op, StoreOp::Query { .. }))
        .collect()
}

#[test]
fn plan_orders_class_fields_before_superclass_fields() {
    let models = ModelRegistry::new()
        .with(
            ClassModel::new("Base")
                .field(FieldModel::relation(
                    "y",
                    RelationModel::one_to_one("A").dependent(),
                ))
                .field(
                    FieldModel::relation("inline", RelationModel::one_to_one("A").dependent())
                        .embedded(),
                ),
        )
        .with(
            ClassModel::new("Sub")
                .extends("Base")
                .field(FieldModel::relation(
                    "x",
                    RelationModel::one_to_many("A").dependent(),
                ))
                .field(FieldModel::relation(
                    "joined",
                    RelationModel::many_to_one("A").bidirectional().join(),
                )),
        )
        .with(
            ClassModel::new("Sibling")
                .extends("Base")
                .field(FieldModel::relation(
                    "z",
                    RelationModel::one_to_one("A").dependent(),
                )),
        )
        .with(ClassModel::new("A"));
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());

    let plan = cascader.build_plan("Sub").expect("plan should build");
    let callbacks: Vec<&str> = plan.callbacks().map(FieldStrategy::field).collect();
    let reserved: Vec<&str> = plan.reserved().map(FieldStrategy::field).collect();

    assert_eq!(callbacks, vec!["x", "y"]);
    assert_eq!(reserved, vec!["joined"]);
    assert_eq!(plan.non_owner().count(), 0);

    let again = cascader.build_plan("Sub").expect("plan should build");
    assert!(Rc::ptr_eq(&plan, &again));

    // a sibling branch shares only the superclass fields
    let sibling = cascader.build_plan("Sibling").expect("plan should build");
    let callbacks: Vec<&str> = sibling.callbacks().map(FieldStrategy::field).collect();
    assert_eq!(callbacks, vec!["z", "y"]);
}

#[test]
fn dependents_are_deleted_before_back_references_are_nulled() {
    let models = models(true);
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let fx = fixture();
    let mut store = fx.store.clone();

    let report = cascader
        .execute(&scope, &mut store, &RowState::new(), &fx.owner)
        .expect("cascade should succeed");

    assert_eq!(
        mutations(&store),
        vec![
            StoreOp::Delete(fx.a.clone()),
            StoreOp::Delete(fx.leaf.clone()),
            StoreOp::Delete(fx.b1.clone()),
            StoreOp::Delete(fx.b2.clone()),
            StoreOp::Put(fx.c.clone()),
        ]
    );
    assert_eq!(report.deleted, vec![fx.a, fx.leaf, fx.b1, fx.b2]);
    assert_eq!(report.nulled, vec![fx.c.clone()]);

    let c = store.row(&fx.c).expect("C survives");
    assert_eq!(c.get("owner"), Some(&Value::Null));
    assert!(store.contains(fx.owner.key()));
    assert!(store.contains(&fx.stray));
}

#[test]
fn non_nullable_back_reference_fails_without_writes() {
    let models = models(false);
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let fx = fixture();
    let mut store = fx.store.clone();

    let err = cascader
        .execute(&scope, &mut store, &RowState::new(), &fx.owner)
        .expect_err("non-nullable back-reference must fail");

    assert_eq!(err.class, ErrorClass::Integrity);
    assert!(matches!(
        err.cascade_error(),
        Some(CascadeError::NonNullableBackReference { field, .. }) if field == "c"
    ));
    assert!(mutations(&store).is_empty());
    assert!(store.contains(&fx.a));
    assert!(store.contains(&fx.b1));
}

#[test]
fn back_reference_from_a_row_deleted_later_is_not_a_violation() {
    // Owner.first -> Child; Child.peer is mapped by the required C.holder,
    // and Owner.second deletes that same C afterwards
    let models = ModelRegistry::new()
        .with(
            ClassModel::new("Owner")
                .field(FieldModel::relation(
                    "first",
                    RelationModel::one_to_one("Child").dependent(),
                ))
                .field(FieldModel::relation(
                    "second",
                    RelationModel::one_to_one("C").dependent(),
                )),
        )
        .with(ClassModel::new("Child").field(FieldModel::relation(
            "peer",
            RelationModel::one_to_one("C").mapped_by("holder"),
        )))
        .with(ClassModel::new("C").field(
            FieldModel::relation("holder", RelationModel::one_to_one("Child")).required(),
        ));
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let mut store = MemoryStore::new();

    let child = key("Child", 1);
    let c = key("C", 2);
    let owner = Row::new(key("Owner", 1))
        .with("first", child.clone())
        .with("second", c.clone());
    store.seed(owner.clone());
    store.seed(Row::new(child.clone()));
    store.seed(Row::new(c.clone()).with("holder", child.clone()));

    let report = cascader
        .execute(&scope, &mut store, &RowState::new(), &owner)
        .expect("C is deleted, so its back-reference needs no null");

    assert_eq!(report.deleted, vec![child.clone(), c.clone()]);
    assert!(report.nulled.is_empty());
    assert_eq!(
        mutations(&store),
        vec![StoreOp::Delete(child), StoreOp::Delete(c)]
    );
}

#[test]
fn delete_removes_owner_last() {
    let models = models(true);
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let fx = fixture();
    let mut store = fx.store.clone();
    metrics_reset_all();

    let report = cascader
        .delete(&scope, &mut store, &RowState::new(), &fx.owner)
        .expect("delete should succeed");

    assert_eq!(report.deleted.last(), Some(fx.owner.key()));
    assert_eq!(
        mutations(&store).last(),
        Some(&StoreOp::Delete(fx.owner.key().clone()))
    );
    assert!(!store.contains(fx.owner.key()));

    let counters = metrics_report(None).counters.expect("counters recorded");
    assert_eq!(counters.ops.cascade_deletes, 4);
    assert_eq!(counters.ops.cascade_nulls, 1);
    assert_eq!(counters.ops.rows_deleted, 5);
}

#[test]
fn loaded_row_state_takes_precedence_over_store_scan() {
    let models = models(true);
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let fx = fixture();
    let mut store = fx.store.clone();

    let state = RowState::new().with_loaded("b", vec![fx.b2.clone()]);
    let report = cascader
        .execute(&scope, &mut store, &state, &fx.owner)
        .expect("cascade should succeed");

    assert_eq!(report.deleted, vec![fx.a, fx.b2]);
    assert!(store.contains(&fx.b1));
    assert!(store.contains(&fx.leaf));
}

#[test]
fn store_failure_aborts_the_cascade() {
    let models = models(true);
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let fx = fixture();
    let mut store = fx.store.clone();
    store.inject_fault(
        FaultOp::Delete,
        StoreError::Unavailable {
            message: "node down".to_string(),
        },
    );

    let err = cascader
        .execute(&scope, &mut store, &RowState::new(), &fx.owner)
        .expect_err("store failure must surface");

    assert_eq!(err.class, ErrorClass::Execution);
    assert!(err.is_retryable());
    assert!(matches!(
        err.cascade_error(),
        Some(CascadeError::StoreWrite { field, .. }) if field == "a"
    ));
    assert!(store.contains(&fx.c));
    assert!(mutations(&store).is_empty());
}

fn join_models() -> ModelRegistry {
    ModelRegistry::new()
        .with(ClassModel::new("Order").field(FieldModel::relation(
            "customer",
            RelationModel::many_to_one("Customer").bidirectional().join(),
        )))
        .with(ClassModel::new("Customer"))
}

#[test]
fn populated_join_relationship_is_rejected_by_default() {
    let models = join_models();
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let mut store = MemoryStore::new();
    let customer = store.seed(Row::new(key("Customer", 1)));
    let order = Row::new(key("Order", 1)).with("customer", customer.clone());
    store.seed(order.clone());

    let err = cascader
        .delete(&scope, &mut store, &RowState::new(), &order)
        .expect_err("join relationship must be rejected");

    assert_eq!(err.class, ErrorClass::Unsupported);
    assert!(matches!(
        err.cascade_error(),
        Some(CascadeError::JoinRelationUnsupported { .. })
    ));
    assert!(store.contains(order.key()));

    // an empty join field has nothing to cascade
    let empty = Row::new(key("Order", 2));
    store.seed(empty.clone());
    cascader
        .delete(&scope, &mut store, &RowState::new(), &empty)
        .expect("empty join field is fine");
    assert!(store.contains(&customer));
}

#[test]
fn skip_policy_leaves_join_relationship_untouched() {
    let models = join_models();
    let config = CascadeConfig {
        join_relation: JoinRelationPolicy::Skip,
        ..CascadeConfig::default()
    };
    let cascader = DependentDeleteCascader::new(&models, config);
    let scope = ConnectionScope::begin(false);
    let mut store = MemoryStore::new();
    let customer = store.seed(Row::new(key("Customer", 1)));
    let order = Row::new(key("Order", 1)).with("customer", customer.clone());
    store.seed(order.clone());

    let report = cascader
        .delete(&scope, &mut store, &RowState::new(), &order)
        .expect("skip policy proceeds");

    assert_eq!(report.deleted, vec![order.key().clone()]);
    assert!(store.contains(&customer));
}

#[test]
fn cross_group_cascade_in_transaction_follows_policy() {
    let models = models(true);
    let scope = ConnectionScope::begin(true);
    let fx = fixture();

    // A(10) and C(30) are roots of their own entity groups
    let rejecting = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let mut store = fx.store.clone();
    let err = rejecting
        .execute(&scope, &mut store, &RowState::new(), &fx.owner)
        .expect_err("cross-group cascade must be rejected");
    assert!(matches!(
        err.cascade_error(),
        Some(CascadeError::CrossEntityGroup { .. })
    ));
    assert!(mutations(&store).is_empty());

    let config = CascadeConfig {
        cross_group: CrossGroupPolicy::Warn,
        ..CascadeConfig::default()
    };
    let warning = DependentDeleteCascader::new(&models, config);
    let report = warning
        .execute(&scope, &mut store, &RowState::new(), &fx.owner)
        .expect("warn policy proceeds");
    assert_eq!(report.deleted.len(), 4);
}

#[test]
fn missing_mapping_is_a_configuration_error() {
    let models = ModelRegistry::new()
        .with(ClassModel::new("Owner").field(FieldModel::relation(
            "c",
            RelationModel::one_to_one("C").mapped_by("absent"),
        )))
        .with(ClassModel::new("C"));
    let cascader = DependentDeleteCascader::new(&models, CascadeConfig::default());
    let scope = ConnectionScope::begin(false);
    let mut store = MemoryStore::new();
    let owner = Row::new(key("Owner", 1));
    store.seed(owner.clone());

    let err = cascader
        .execute(&scope, &mut store, &RowState::new(), &owner)
        .expect_err("missing mapping must fail");

    assert_eq!(err.class, ErrorClass::Configuration);
}
