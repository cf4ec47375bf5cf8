use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters and simple perf totals for operations.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub perf: EventPerf,
    pub kinds: BTreeMap<String, KindCounters>,

    /// Translator refusals keyed by reason label.
    pub refusals: BTreeMap<String, u64>,
    pub window_start_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            perf: EventPerf::default(),
            kinds: BTreeMap::new(),
            refusals: BTreeMap::new(),
            window_start_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Engine entrypoints
    pub query_calls: u64,
    pub insert_calls: u64,
    pub delete_calls: u64,

    // Planner paths
    pub plan_native: u64,
    pub plan_in_memory: u64,

    // Rows touched
    pub rows_returned: u64,
    pub rows_scanned: u64,
    pub rows_written: u64,
    pub rows_deleted: u64,

    // Cursors
    pub cursor_disconnects: u64,
    pub rows_buffered: u64,

    // Cascades
    pub cascade_deletes: u64,
    pub cascade_nulls: u64,
    pub cascade_rejections: u64,

    pub unique_violations: u64,
}

///
/// KindCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct KindCounters {
    pub query_calls: u64,
    pub insert_calls: u64,
    pub delete_calls: u64,
    pub plan_native: u64,
    pub plan_in_memory: u64,
    pub rows_returned: u64,
    pub rows_scanned: u64,
    pub rows_written: u64,
    pub rows_deleted: u64,
    pub cascade_deletes: u64,
    pub cascade_rejections: u64,
    pub unique_violations: u64,
}

///
/// EventPerf
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventPerf {
    // Wall-clock totals per entrypoint
    pub query_micros_total: u128,
    pub insert_micros_total: u128,
    pub delete_micros_total: u128,

    // Maximum observed durations
    pub query_micros_max: u64,
    pub insert_micros_max: u64,
    pub delete_micros_max: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all event state: counters, perf, and the window start.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Accumulate an elapsed duration and track a max.
pub(crate) fn add_elapsed(total: &mut u128, max: &mut u64, delta: u64) {
    *total = total.saturating_add(u128::from(delta));
    if delta > *max {
        *max = delta;
    }
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `window_start_ms`.
    pub counters: Option<EventState>,
    /// Per-kind counters and averages.
    pub kind_counters: Vec<KindSummary>,
}

///
/// KindSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct KindSummary {
    pub kind: String,
    pub query_calls: u64,
    pub delete_calls: u64,
    pub rows_returned: u64,
    pub rows_scanned: u64,
    pub rows_deleted: u64,
    pub avg_rows_per_query: f64,
    pub native_ratio: f64,
    pub cascade_deletes: u64,
    pub unique_violations: u64,
}

/// Build a report if the current window started at or after `window_start_ms`.
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if window_start_ms.is_some_and(|start| start > snap.window_start_ms) {
        return EventReport::default();
    }

    report_from(snap)
}

#[allow(clippy::cast_precision_loss)]
fn report_from(snap: EventState) -> EventReport {
    let mut kind_counters: Vec<KindSummary> = snap
        .kinds
        .iter()
        .map(|(kind, ops)| {
            let avg_rows = if ops.query_calls > 0 {
                ops.rows_returned as f64 / ops.query_calls as f64
            } else {
                0.0
            };
            let planned = ops.plan_native.saturating_add(ops.plan_in_memory);
            let native_ratio = if planned > 0 {
                ops.plan_native as f64 / planned as f64
            } else {
                0.0
            };

            KindSummary {
                kind: kind.clone(),
                query_calls: ops.query_calls,
                delete_calls: ops.delete_calls,
                rows_returned: ops.rows_returned,
                rows_scanned: ops.rows_scanned,
                rows_deleted: ops.rows_deleted,
                avg_rows_per_query: avg_rows,
                native_ratio,
                cascade_deletes: ops.cascade_deletes,
                unique_violations: ops.unique_violations,
            }
        })
        .collect();

    kind_counters.sort_by(|a, b| {
        match b
            .avg_rows_per_query
            .partial_cmp(&a.avg_rows_per_query)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => match b.rows_returned.cmp(&a.rows_returned) {
                Ordering::Equal => a.kind.cmp(&b.kind),
                other => other,
            },
            other => other,
        }
    });

    EventReport {
        counters: Some(snap),
        kind_counters,
    }
}

///
/// TESTS
///
