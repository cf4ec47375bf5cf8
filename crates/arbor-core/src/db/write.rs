//! Object-graph write path.
//!
//! Children embed their parent's key in their own, so a parent must be
//! written (and its id minted) before any owned child. The KeyRegistry
//! carries the parent key from the parent's write to the child's.

use crate::{
    db::{row::Row, scope::ConnectionScope, scope::ObjectHandle, store::StoreClient},
    error::InternalError,
    key::Key,
    model::{MetadataProvider, RelationKind},
    obs::sink::{ExecKind, Span},
    value::Value,
};

///
/// PendingObject
///
/// In-flight object: its scope handle, its row (key possibly incomplete),
/// and the owned children to write under it.
///

#[derive(Clone, Debug)]
pub struct PendingObject {
    pub handle: ObjectHandle,
    pub row: Row,
    pub owned: Vec<OwnedChildren>,
}

impl PendingObject {
    #[must_use]
    pub const fn new(handle: ObjectHandle, row: Row) -> Self {
        Self {
            handle,
            row,
            owned: Vec::new(),
        }
    }

    /// Attach owned children stored through relationship field `field`.
    #[must_use]
    pub fn with_children(mut self, field: impl Into<String>, children: Vec<Self>) -> Self {
        self.owned.push(OwnedChildren {
            field: field.into(),
            children,
        });
        self
    }
}

///
/// OwnedChildren
///

#[derive(Clone, Debug)]
pub struct OwnedChildren {
    pub field: String,
    pub children: Vec<PendingObject>,
}

///
/// GraphWriter
///

pub struct GraphWriter<'m, M: MetadataProvider + ?Sized> {
    metadata: &'m M,
}

impl<'m, M: MetadataProvider + ?Sized> GraphWriter<'m, M> {
    #[must_use]
    pub const fn new(metadata: &'m M) -> Self {
        Self { metadata }
    }

    /// Write `object` and its owned children, returning the object's key.
    pub fn insert<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &mut S,
        object: PendingObject,
    ) -> Result<Key, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        // the whole graph is checked before the first row is written
        self.check_owned(&object)?;

        let kind = object.row.kind().to_string();
        let mut span = Span::new(ExecKind::Insert, &kind);

        self.insert_object(scope, store, object, &mut span)
    }

    fn check_owned(&self, object: &PendingObject) -> Result<(), InternalError> {
        let kind = object.row.kind();
        for group in &object.owned {
            self.owned_relation(kind, group)?;
            for child in &group.children {
                self.check_owned(child)?;
            }
        }

        Ok(())
    }

    fn insert_object<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &mut S,
        object: PendingObject,
        span: &mut Span<'_>,
    ) -> Result<Key, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let PendingObject {
            handle,
            mut row,
            owned,
        } = object;

        apply_registered_parent(scope, handle, &mut row)?;

        let kind = row.kind().to_string();
        let (_, properties) = row.clone().into_parts();
        let key = store
            .put(row)
            .map_err(|err| InternalError::write_store(format!("insert of '{kind}'"), err))?;
        span.add_rows(1);
        tracing::debug!(%key, "row written");

        if owned.is_empty() {
            return Ok(key);
        }

        let mut written = Row::new(key.clone());
        for (name, value) in properties {
            written.set(name, value);
        }

        for group in owned {
            let relation_kind = self.owned_relation(&kind, &group)?;

            let mut child_keys = Vec::with_capacity(group.children.len());
            for child in group.children {
                scope
                    .registry_mut()
                    .register_parent(child.handle, key.clone())?;
                child_keys.push(self.insert_object(scope, store, child, span)?);
            }

            let value = match relation_kind {
                RelationKind::OneToMany => Value::from(child_keys),
                _ => child_keys.pop().map_or(Value::Null, Value::Key),
            };
            written.set(group.field, value);
        }

        // denormalized relationship fields changed; rewrite the parent
        scope.registry_mut().mark_parent_modified(key.clone());
        store
            .put(written)
            .map_err(|err| InternalError::write_store(format!("rewrite of {key}"), err))?;
        scope.registry_mut().clear_parent_modified(&key);

        Ok(key)
    }

    fn owned_relation(
        &self,
        kind: &str,
        group: &OwnedChildren,
    ) -> Result<RelationKind, InternalError> {
        let field = &group.field;
        let model = self.metadata.field(kind, field)?.ok_or_else(|| {
            InternalError::model_configuration(format!(
                "class '{kind}' has no field '{field}'"
            ))
        })?;

        let relation_kind = match &model.relation {
            Some(relation) if relation.owned => relation.kind,
            _ => {
                return Err(InternalError::model_configuration(format!(
                    "field '{kind}.{field}' is not an owned relationship"
                )));
            }
        };

        let count = group.children.len();
        if relation_kind != RelationKind::OneToMany && count > 1 {
            return Err(InternalError::write_invariant(format!(
                "field '{kind}.{field}' holds a single reference but {count} children were supplied"
            )));
        }

        Ok(relation_kind)
    }
}

// Consume the registered parent and embed it in the row's pending key.
fn apply_registered_parent(
    scope: &mut ConnectionScope,
    handle: ObjectHandle,
    row: &mut Row,
) -> Result<(), InternalError> {
    let Some(parent) = scope.registry_mut().take_parent(handle) else {
        return Ok(());
    };

    if row.key().is_complete() {
        // keys are immutable once complete; only an identical ancestor is accepted
        if row.key().parent().as_ref() == Some(&parent) {
            return Ok(());
        }
        return Err(InternalError::write_invariant(format!(
            "cannot re-parent {} under {parent}: complete keys are immutable",
            row.key()
        )));
    }

    let key = Key::incomplete(row.kind(), Some(&parent))?;
    row.rekey(key);

    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::store::{MemoryStore, StoreOp},
        model::{ClassModel, FieldModel, ModelRegistry, RelationModel},
    };

    fn models() -> ModelRegistry {
        ModelRegistry::new()
            .with(
                ClassModel::new("Person")
                    .field(FieldModel::property("name"))
                    .field(FieldModel::relation(
                        "pets",
                        RelationModel::one_to_many("Pet").owned().dependent(),
                    ))
                    .field(FieldModel::relation(
                        "passport",
                        RelationModel::one_to_one("Passport").owned(),
                    ))
                    .field(FieldModel::relation(
                        "friend",
                        RelationModel::one_to_one("Person"),
                    )),
            )
            .with(ClassModel::new("Pet").field(FieldModel::property("name")))
            .with(ClassModel::new("Passport"))
    }

    fn pending(scope: &mut ConnectionScope, kind: &str) -> PendingObject {
        let handle = scope.new_object();
        let key = Key::incomplete(kind, None).expect("valid key");

        PendingObject::new(handle, Row::new(key))
    }

    #[test]
    fn children_embed_freshly_minted_parent_key() {
        let models = models();
        let writer = GraphWriter::new(&models);
        let mut scope = ConnectionScope::begin(true);
        let mut store = MemoryStore::new();

        let pets = vec![pending(&mut scope, "Pet"), pending(&mut scope, "Pet")];
        let passport = vec![pending(&mut scope, "Passport")];
        let person = pending(&mut scope, "Person")
            .with_children("pets", pets)
            .with_children("passport", passport);

        let key = writer
            .insert(&mut scope, &mut store, person)
            .expect("insert should succeed");

        let pets = store.rows_of_kind("Pet");
        assert_eq!(pets.len(), 2);
        assert!(pets.iter().all(|pet| pet.key().parent() == Some(key.clone())));

        let stored = store.row(&key).expect("parent row");
        let pet_keys: Vec<Value> = pets.iter().map(|pet| Value::Key(pet.key().clone())).collect();
        assert_eq!(stored.get("pets"), Some(&Value::List(pet_keys)));
        assert!(matches!(stored.get("passport"), Some(Value::Key(_))));

        // registry entries consumed; modified flag cleared after rewrite
        assert!(scope.registry().is_empty());

        let ops = store.ops();
        assert_eq!(ops.first(), Some(&StoreOp::Put(key.clone())));
        assert_eq!(ops.last(), Some(&StoreOp::Put(key)));
    }

    #[test]
    fn last_registration_wins() {
        let models = models();
        let writer = GraphWriter::new(&models);
        let mut scope = ConnectionScope::begin(false);
        let mut store = MemoryStore::new();

        let first = Key::new("Person", 1_u64).expect("valid key");
        let second = Key::new("Person", 2_u64).expect("valid key");
        let pet = pending(&mut scope, "Pet");
        scope
            .registry_mut()
            .register_parent(pet.handle, first)
            .expect("register");
        scope
            .registry_mut()
            .register_parent(pet.handle, second.clone())
            .expect("re-register");

        let key = writer
            .insert(&mut scope, &mut store, pet)
            .expect("insert should succeed");

        assert_eq!(key.parent(), Some(second));
    }

    #[test]
    fn complete_keys_cannot_be_reparented() {
        let models = models();
        let writer = GraphWriter::new(&models);
        let mut scope = ConnectionScope::begin(false);
        let mut store = MemoryStore::new();

        let handle = scope.new_object();
        let row = Row::new(Key::new("Pet", 5_u64).expect("valid key"));
        scope
            .registry_mut()
            .register_parent(handle, Key::new("Person", 1_u64).expect("valid key"))
            .expect("register");

        let err = writer
            .insert(&mut scope, &mut store, PendingObject::new(handle, row))
            .expect_err("re-parenting must fail");

        assert_eq!(err.class, crate::error::ErrorClass::InvariantViolation);
        assert!(store.is_empty());
    }

    #[test]
    fn children_through_unowned_field_are_rejected() {
        let models = models();
        let writer = GraphWriter::new(&models);
        let mut scope = ConnectionScope::begin(false);
        let mut store = MemoryStore::new();

        let friend = vec![pending(&mut scope, "Person")];
        let person = pending(&mut scope, "Person").with_children("friend", friend);

        let err = writer
            .insert(&mut scope, &mut store, person)
            .expect_err("unowned field must be rejected");
        assert_eq!(err.class, crate::error::ErrorClass::Configuration);
        assert!(store.is_empty());
    }

    #[test]
    fn oversized_single_reference_writes_nothing() {
        let models = models();
        let writer = GraphWriter::new(&models);
        let mut scope = ConnectionScope::begin(false);
        let mut store = MemoryStore::new();

        let pets = vec![pending(&mut scope, "Pet")];
        let passports = vec![pending(&mut scope, "Passport"), pending(&mut scope, "Passport")];
        let person = pending(&mut scope, "Person")
            .with_children("pets", pets)
            .with_children("passport", passports);

        let err = writer
            .insert(&mut scope, &mut store, person)
            .expect_err("two children for a single reference must be rejected");
        assert_eq!(err.class, crate::error::ErrorClass::InvariantViolation);
        assert!(store.is_empty());
        assert!(store.ops().is_empty());
    }
}
