use crate::{
    config::{CascadeConfig, CrossGroupPolicy, DEFAULT_CURSOR_BATCH_SIZE, JoinRelationPolicy},
    db::{
        cascade::{CascadeError, CascadePlan, CascadeReport, FieldStrategy, RowState},
        query::{NativeField, NativeFilter, NativeOp, ScanDescriptor},
        row::Row,
        scope::ConnectionScope,
        store::{StoreClient, StoreError, drain_cursor},
    },
    error::{ErrorClass, InternalError},
    key::Key,
    model::MetadataProvider,
    obs::sink::{self, ExecKind, MetricsEvent, Span},
    value::Value,
};
use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    rc::Rc,
};

///
/// DependentDeleteCascader
///
/// Deletes dependent rows and nulls non-owner back-references ahead of an
/// owner's delete. Plans are built once per class and cached; class
/// metadata is immutable after load.
///

pub struct DependentDeleteCascader<'m, M: MetadataProvider + ?Sized> {
    metadata: &'m M,
    config: CascadeConfig,
    plans: RefCell<HashMap<String, Rc<CascadePlan>>>,
}

#[derive(Debug)]
struct StagedDelete {
    key: Key,
    field: &'static str,
}

#[derive(Debug)]
struct StagedNull {
    row: Row,
    field: &'static str,
}

#[derive(Debug)]
struct StagedViolation {
    related: Key,
    error: CascadeError,
}

#[derive(Debug, Default)]
struct Staged {
    deletes: Vec<StagedDelete>,
    nulls: Vec<StagedNull>,

    // every row the cascade removes, owner included
    doomed: BTreeSet<Key>,

    // non-nullable back-references; fatal unless the row is doomed by the end
    violations: Vec<StagedViolation>,
}

impl<'m, M: MetadataProvider + ?Sized> DependentDeleteCascader<'m, M> {
    #[must_use]
    pub fn new(metadata: &'m M, config: CascadeConfig) -> Self {
        Self {
            metadata,
            config,
            plans: RefCell::new(HashMap::new()),
        }
    }

    /// Strategy list for `class`, built on first use.
    pub fn build_plan(&self, class: &str) -> Result<Rc<CascadePlan>, InternalError> {
        if let Some(plan) = self.plans.borrow().get(class) {
            return Ok(Rc::clone(plan));
        }

        let plan = Rc::new(CascadePlan::build(self.metadata, class)?);
        self.plans
            .borrow_mut()
            .insert(class.to_string(), Rc::clone(&plan));

        Ok(plan)
    }

    /// Run the cascade for `owner` without deleting the owner itself.
    pub fn execute<S>(
        &self,
        scope: &ConnectionScope,
        store: &mut S,
        row_state: &RowState,
        owner: &Row,
    ) -> Result<CascadeReport, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        self.run(scope, store, row_state, owner, false)
    }

    /// Run the cascade, then delete the owner row.
    pub fn delete<S>(
        &self,
        scope: &ConnectionScope,
        store: &mut S,
        row_state: &RowState,
        owner: &Row,
    ) -> Result<CascadeReport, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        self.run(scope, store, row_state, owner, true)
    }

    fn run<S>(
        &self,
        scope: &ConnectionScope,
        store: &mut S,
        row_state: &RowState,
        owner: &Row,
        delete_owner: bool,
    ) -> Result<CascadeReport, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let kind = owner.kind();
        let mut span = Span::new(ExecKind::Delete, kind);

        let staged = match self.stage(scope, &*store, row_state, owner) {
            Ok(staged) => staged,
            Err(err) => {
                sink::record(MetricsEvent::CascadeRejected { kind });
                tracing::debug!(owner = %owner.key(), error = %err, "cascade rejected");
                return Err(err);
            }
        };

        let report = apply(store, owner.key(), staged, delete_owner)?;
        span.set_rows(report.deleted.len() as u64);

        let cascaded = report.deleted.len() - usize::from(delete_owner);
        sink::record(MetricsEvent::CascadeApplied {
            kind,
            rows_deleted: cascaded as u64,
            references_nulled: report.nulled.len() as u64,
        });
        tracing::debug!(
            owner = %owner.key(),
            deleted = cascaded,
            nulled = report.nulled.len(),
            "cascade applied"
        );

        Ok(report)
    }

    // Resolve every mutation up front; nothing is written here.
    fn stage<S>(
        &self,
        scope: &ConnectionScope,
        store: &S,
        row_state: &RowState,
        owner: &Row,
    ) -> Result<Staged, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let mut staged = Staged::default();
        staged.doomed.insert(owner.key().clone());

        self.stage_row(store, Some(row_state), owner, &mut staged)?;

        if let Some(violation) = staged
            .violations
            .iter()
            .find(|violation| !staged.doomed.contains(&violation.related))
        {
            return Err(InternalError::cascade(
                ErrorClass::Integrity,
                violation.error.clone(),
            ));
        }

        self.check_entity_group(scope, owner.key(), &staged)?;

        Ok(staged)
    }

    fn stage_row<S>(
        &self,
        store: &S,
        row_state: Option<&RowState>,
        row: &Row,
        staged: &mut Staged,
    ) -> Result<(), InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let plan = self.build_plan(row.kind())?;

        for strategy in plan.reserved() {
            self.check_reserved(row, strategy.field())?;
        }

        for strategy in plan.callbacks() {
            let FieldStrategy::DependentDelete {
                field,
                target,
                owned,
                mapped_by,
            } = *strategy
            else {
                continue;
            };

            let loaded = row_state.and_then(|state| state.loaded(field));
            let children = match (loaded, owned, mapped_by) {
                (Some(keys), _, _) => load_rows(store, row.key(), field, keys)?,
                (None, true, _) => owned_children(store, row.key(), field, target)?,
                (None, false, Some(back)) => {
                    scan_rows(store, &back_reference_scan(target, back, row.key()))
                        .map_err(|err| store_failure(row.key(), field, err))?
                }
                (None, false, None) => {
                    let keys = row.get(field).map(Value::referenced_keys).unwrap_or_default();
                    load_rows(store, row.key(), field, &keys)?
                }
            };

            for child in children {
                // each row is deleted at most once, whichever path reaches it first
                if !staged.doomed.insert(child.key().clone()) {
                    continue;
                }
                self.stage_row(store, None, &child, staged)?;
                staged.deletes.push(StagedDelete {
                    key: child.key().clone(),
                    field,
                });
            }
        }

        for strategy in plan.non_owner() {
            let FieldStrategy::NonOwnerNull {
                field,
                target,
                mapped_by,
            } = *strategy
            else {
                continue;
            };
            self.stage_nulls(store, row, field, target, mapped_by, staged)?;
        }

        Ok(())
    }

    fn stage_nulls<S>(
        &self,
        store: &S,
        row: &Row,
        field: &'static str,
        target: &'static str,
        mapped_by: &'static str,
        staged: &mut Staged,
    ) -> Result<(), InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let mapping = self.metadata.field(target, mapped_by)?.ok_or_else(|| {
            InternalError::cascade(
                ErrorClass::Configuration,
                CascadeError::MissingMapping {
                    class: row.kind().to_string(),
                    field: field.to_string(),
                    target: target.to_string(),
                    mapped_by: mapped_by.to_string(),
                },
            )
        })?;

        let related = scan_rows(store, &back_reference_scan(target, mapped_by, row.key()))
            .map_err(|err| store_failure(row.key(), field, err))?;

        for mut related_row in related {
            if staged.doomed.contains(related_row.key()) {
                continue;
            }
            if !mapping.nullable {
                staged.violations.push(StagedViolation {
                    related: related_row.key().clone(),
                    error: CascadeError::NonNullableBackReference {
                        owner: row.key().to_string(),
                        field: field.to_string(),
                        related_kind: target.to_string(),
                        mapped_by: mapped_by.to_string(),
                    },
                });
                continue;
            }

            // a row reached through two fields is written once
            if let Some(existing) = staged
                .nulls
                .iter_mut()
                .find(|null| null.row.key() == related_row.key())
            {
                existing.row.set(mapped_by, Value::Null);
                continue;
            }
            related_row.set(mapped_by, Value::Null);
            staged.nulls.push(StagedNull {
                row: related_row,
                field: mapped_by,
            });
        }

        Ok(())
    }

    fn check_reserved(&self, row: &Row, field: &'static str) -> Result<(), InternalError> {
        if row
            .get(field)
            .is_none_or(|value| value.referenced_keys().is_empty())
        {
            return Ok(());
        }

        match self.config.join_relation {
            JoinRelationPolicy::Reject => Err(InternalError::cascade(
                ErrorClass::Unsupported,
                CascadeError::JoinRelationUnsupported {
                    owner: row.key().to_string(),
                    class: row.kind().to_string(),
                    field: field.to_string(),
                },
            )),
            JoinRelationPolicy::Skip => {
                tracing::warn!(
                    owner = %row.key(),
                    field,
                    "join relationship left untouched by cascade"
                );
                Ok(())
            }
        }
    }

    // Transactional scopes cannot atomically touch a second entity group.
    fn check_entity_group(
        &self,
        scope: &ConnectionScope,
        owner: &Key,
        staged: &Staged,
    ) -> Result<(), InternalError> {
        if !scope.is_transactional() {
            return Ok(());
        }

        let outside = staged
            .deletes
            .iter()
            .map(|delete| &delete.key)
            .chain(staged.nulls.iter().map(|null| null.row.key()))
            .find(|key| !key.same_entity_group(owner));
        let Some(related) = outside else {
            return Ok(());
        };

        match self.config.cross_group {
            CrossGroupPolicy::Reject => Err(InternalError::cascade(
                ErrorClass::Unsupported,
                CascadeError::CrossEntityGroup {
                    owner: owner.to_string(),
                    related: related.to_string(),
                },
            )),
            CrossGroupPolicy::Warn => {
                tracing::warn!(
                    %owner,
                    %related,
                    "cascade crosses entity groups inside a transaction"
                );
                Ok(())
            }
        }
    }
}

// Write the staged batch: dependents, then back-references, then the owner.
fn apply<S>(
    store: &mut S,
    owner: &Key,
    staged: Staged,
    delete_owner: bool,
) -> Result<CascadeReport, InternalError>
where
    S: StoreClient + ?Sized,
{
    let Staged {
        deletes,
        nulls,
        doomed,
        violations: _,
    } = staged;
    let mut report = CascadeReport::default();

    for StagedDelete { key, field } in deletes {
        store
            .delete(&key)
            .map_err(|err| store_failure(owner, field, err))?;
        report.deleted.push(key);
    }

    for StagedNull { row, field } in nulls {
        // nulled first, deleted later through another path
        if doomed.contains(row.key()) {
            continue;
        }
        let key = store
            .put(row)
            .map_err(|err| store_failure(owner, field, err))?;
        report.nulled.push(key);
    }

    if delete_owner {
        store
            .delete(owner)
            .map_err(|err| InternalError::write_store(format!("delete of {owner}"), err))?;
        report.deleted.push(owner.clone());
    }

    Ok(report)
}

// Rows whose `field` references `owner`.
fn back_reference_scan(kind: &str, field: &str, owner: &Key) -> ScanDescriptor {
    ScanDescriptor {
        filters: vec![NativeFilter {
            field: NativeField::Property(field.to_string()),
            op: NativeOp::Eq,
            value: Value::Key(owner.clone()),
        }],
        ..ScanDescriptor::full_kind(kind)
    }
}

// Hierarchical children directly under `owner`.
fn owned_children<S>(
    store: &S,
    owner: &Key,
    field: &'static str,
    target: &str,
) -> Result<Vec<Row>, InternalError>
where
    S: StoreClient + ?Sized,
{
    let rows = scan_rows(store, &ScanDescriptor::under(target, owner.clone()))
        .map_err(|err| store_failure(owner, field, err))?;

    Ok(rows
        .into_iter()
        .filter(|row| row.key().parent().as_ref() == Some(owner))
        .collect())
}

fn load_rows<S>(
    store: &S,
    owner: &Key,
    field: &'static str,
    keys: &[Key],
) -> Result<Vec<Row>, InternalError>
where
    S: StoreClient + ?Sized,
{
    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        match store.get(key).map_err(|err| store_failure(owner, field, err))? {
            Some(row) => rows.push(row),
            None => tracing::debug!(%key, field, "dependent row already gone"),
        }
    }

    Ok(rows)
}

fn scan_rows<S>(store: &S, scan: &ScanDescriptor) -> Result<Vec<Row>, StoreError>
where
    S: StoreClient + ?Sized,
{
    let mut cursor = store.run_native_query(scan)?;

    drain_cursor(cursor.as_mut(), DEFAULT_CURSOR_BATCH_SIZE)
}

fn store_failure(owner: &Key, field: &str, err: StoreError) -> InternalError {
    InternalError::cascade(
        ErrorClass::Execution,
        CascadeError::StoreWrite {
            owner: owner.to_string(),
            field: field.to_string(),
            source: err,
        },
    )
}
