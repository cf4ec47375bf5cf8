use crate::{
    db::{
        query::{NativeField, NativeOp, ScanDescriptor, sort_cmp},
        row::Row,
        store::{StoreClient, StoreCursor, StoreError},
    },
    key::{Key, KeyId},
    value::Value,
};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::Rc,
};

///
/// MemoryStoreStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MemoryStoreStats {
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub native_queries: u64,
    pub batches_fetched: u64,
    pub rows_fetched: u64,
}

///
/// StoreOp
///
/// Mutations and queries in the order the store received them.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreOp {
    Put(Key),
    Delete(Key),
    Query { kind: String },
}

///
/// FaultOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultOp {
    Get,
    Put,
    Delete,
    Query,
    Fetch,
}

#[derive(Debug)]
struct Fault {
    op: FaultOp,
    skip: usize,
    error: StoreError,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<Key, Row>,
    next_id: u64,
    stats: MemoryStoreStats,
    ops: Vec<StoreOp>,
    faults: Vec<Fault>,
}

impl MemoryState {
    // Consume a matching fault, if one is due.
    fn take_fault(&mut self, op: FaultOp) -> Result<(), StoreError> {
        let Some(index) = self.faults.iter().position(|fault| fault.op == op) else {
            return Ok(());
        };
        let fault = &mut self.faults[index];
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }

        Err(self.faults.remove(index).error)
    }

    fn mint_id(&mut self) -> KeyId {
        self.next_id += 1;
        KeyId::Id(self.next_id)
    }
}

///
/// MemoryStore
///
/// In-process store client. Clones share the same underlying state.
///
/// Native scans honor the native operator subset using the same comparison
/// rules as in-memory evaluation; unsorted results come back in key order.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing statistics and the operation log.
    /// Incomplete keys are completed with a minted id.
    pub fn seed(&self, mut row: Row) -> Key {
        let mut state = self.state.borrow_mut();
        if !row.key().is_complete() {
            let id = state.mint_id();
            let completed = row.complete_key(id);
            debug_assert!(completed.is_ok(), "incomplete key rejected an id: {completed:?}");
        }
        if let Some(KeyId::Id(id)) = row.key().id() {
            state.next_id = state.next_id.max(*id);
        }
        let key = row.key().clone();
        state.rows.insert(key.clone(), row);

        key
    }

    #[must_use]
    pub fn row(&self, key: &Key) -> Option<Row> {
        self.state.borrow().rows.get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.state.borrow().rows.contains_key(key)
    }

    /// Every row of `kind`, in key order.
    #[must_use]
    pub fn rows_of_kind(&self, kind: &str) -> Vec<Row> {
        self.state
            .borrow()
            .rows
            .values()
            .filter(|row| row.kind() == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().rows.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        self.state.borrow().stats
    }

    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.state.borrow().ops.clone()
    }

    /// Reset statistics and the operation log.
    pub fn reset_observations(&self) {
        let mut state = self.state.borrow_mut();
        state.stats = MemoryStoreStats::default();
        state.ops.clear();
    }

    /// Fail the next `op` with `error`.
    pub fn inject_fault(&self, op: FaultOp, error: StoreError) {
        self.inject_fault_after(op, 0, error);
    }

    /// Let `skip` calls of `op` succeed, then fail the next one.
    pub fn inject_fault_after(&self, op: FaultOp, skip: usize, error: StoreError) {
        self.state
            .borrow_mut()
            .faults
            .push(Fault { op, skip, error });
    }

    fn scan(state: &MemoryState, scan: &ScanDescriptor) -> Vec<Row> {
        let mut rows: Vec<Row> = state
            .rows
            .values()
            .filter(|row| scan.matches(row))
            .cloned()
            .collect();

        if !scan.sorts.is_empty() {
            // stable; ties stay in key order
            rows.sort_by(|a, b| {
                for sort in &scan.sorts {
                    let left = sort.field.resolve(a).unwrap_or(Value::Null);
                    let right = sort.field.resolve(b).unwrap_or(Value::Null);
                    let ord = sort_cmp(&left, &right, sort.direction);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        scan.range.apply(rows)
    }
}

fn check_native(scan: &ScanDescriptor) -> Result<(), StoreError> {
    let inequality: BTreeSet<&NativeField> = scan
        .filters
        .iter()
        .filter(|filter| filter.op.is_inequality())
        .map(|filter| &filter.field)
        .collect();
    if inequality.len() > 1 {
        return Err(StoreError::Rejected {
            message: "inequality filters on more than one property".to_string(),
        });
    }
    if let Some(filter) = scan
        .filters
        .iter()
        .find(|filter| filter.op == NativeOp::In && filter.value.as_list().is_none())
    {
        return Err(StoreError::Rejected {
            message: format!("'in' filter on {} requires a list", filter.field),
        });
    }

    Ok(())
}

impl StoreClient for MemoryStore {
    fn get(&self, key: &Key) -> Result<Option<Row>, StoreError> {
        let mut state = self.state.borrow_mut();
        state.take_fault(FaultOp::Get)?;
        state.stats.gets += 1;

        Ok(state.rows.get(key).cloned())
    }

    fn put(&mut self, mut row: Row) -> Result<Key, StoreError> {
        let mut state = self.state.borrow_mut();
        state.take_fault(FaultOp::Put)?;

        if !row.key().is_complete() {
            let id = state.mint_id();
            row.complete_key(id).map_err(|err| StoreError::Rejected {
                message: err.to_string(),
            })?;
        }
        let key = row.key().clone();
        state.stats.puts += 1;
        state.ops.push(StoreOp::Put(key.clone()));
        state.rows.insert(key.clone(), row);

        Ok(key)
    }

    fn delete(&mut self, key: &Key) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.take_fault(FaultOp::Delete)?;

        state.stats.deletes += 1;
        state.ops.push(StoreOp::Delete(key.clone()));
        state.rows.remove(key);

        Ok(())
    }

    fn run_native_query(&self, scan: &ScanDescriptor) -> Result<Box<dyn StoreCursor>, StoreError> {
        let mut state = self.state.borrow_mut();
        state.take_fault(FaultOp::Query)?;
        check_native(scan)?;

        state.stats.native_queries += 1;
        state.ops.push(StoreOp::Query {
            kind: scan.kind.clone(),
        });
        let rows = Self::scan(&state, scan);

        Ok(Box::new(MemoryCursor {
            state: Rc::clone(&self.state),
            rows: rows.into(),
        }))
    }
}

///
/// MemoryCursor
///
/// Results are snapshotted at query time and handed out in batches.
///

struct MemoryCursor {
    state: Rc<RefCell<MemoryState>>,
    rows: VecDeque<Row>,
}

impl StoreCursor for MemoryCursor {
    fn next_batch(&mut self, limit: usize) -> Result<Vec<Row>, StoreError> {
        let mut state = self.state.borrow_mut();
        state.take_fault(FaultOp::Fetch)?;

        let take = limit.min(self.rows.len());
        let batch: Vec<Row> = self.rows.drain(..take).collect();
        state.stats.batches_fetched += 1;
        state.stats.rows_fetched += batch.len() as u64;

        Ok(batch)
    }
}

///
/// TESTS
///
