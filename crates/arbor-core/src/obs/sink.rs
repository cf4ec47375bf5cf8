//! Metrics sink boundary.
//!
//! Core logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the global metrics state.
use crate::{db::query::RefusalReason, obs::metrics};
use std::{cell::RefCell, rc::Rc, time::Instant};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Query,
    Insert,
    Delete,
}

///
/// PathKind
///
/// Execution path chosen by the planner.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathKind {
    Native,
    InMemory,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    ExecStart {
        exec: ExecKind,
        kind: &'a str,
    },
    ExecFinish {
        exec: ExecKind,
        kind: &'a str,
        rows_touched: u64,
        elapsed_micros: u64,
    },
    Plan {
        kind: &'a str,
        path: PathKind,
    },
    TranslationRefused {
        kind: &'a str,
        reason: RefusalReason,
    },
    RowsScanned {
        kind: &'a str,
        rows_scanned: u64,
    },
    UniqueViolation {
        kind: &'a str,
    },
    CursorDisconnected {
        rows_buffered: u64,
    },
    CascadeApplied {
        kind: &'a str,
        rows_deleted: u64,
        references_nulled: u64,
    },
    CascadeRejected {
        kind: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default thread-local sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::ExecStart { exec, kind } => {
                metrics::with_state_mut(|m| {
                    match exec {
                        ExecKind::Query => m.ops.query_calls = m.ops.query_calls.saturating_add(1),
                        ExecKind::Insert => {
                            m.ops.insert_calls = m.ops.insert_calls.saturating_add(1);
                        }
                        ExecKind::Delete => {
                            m.ops.delete_calls = m.ops.delete_calls.saturating_add(1);
                        }
                    }

                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    match exec {
                        ExecKind::Query => entry.query_calls = entry.query_calls.saturating_add(1),
                        ExecKind::Insert => {
                            entry.insert_calls = entry.insert_calls.saturating_add(1);
                        }
                        ExecKind::Delete => {
                            entry.delete_calls = entry.delete_calls.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::ExecFinish {
                exec,
                kind,
                rows_touched,
                elapsed_micros,
            } => {
                metrics::with_state_mut(|m| {
                    match exec {
                        ExecKind::Query => {
                            m.ops.rows_returned = m.ops.rows_returned.saturating_add(rows_touched);
                            metrics::add_elapsed(
                                &mut m.perf.query_micros_total,
                                &mut m.perf.query_micros_max,
                                elapsed_micros,
                            );
                        }
                        ExecKind::Insert => {
                            m.ops.rows_written = m.ops.rows_written.saturating_add(rows_touched);
                            metrics::add_elapsed(
                                &mut m.perf.insert_micros_total,
                                &mut m.perf.insert_micros_max,
                                elapsed_micros,
                            );
                        }
                        ExecKind::Delete => {
                            m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(rows_touched);
                            metrics::add_elapsed(
                                &mut m.perf.delete_micros_total,
                                &mut m.perf.delete_micros_max,
                                elapsed_micros,
                            );
                        }
                    }

                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    match exec {
                        ExecKind::Query => {
                            entry.rows_returned = entry.rows_returned.saturating_add(rows_touched);
                        }
                        ExecKind::Insert => {
                            entry.rows_written = entry.rows_written.saturating_add(rows_touched);
                        }
                        ExecKind::Delete => {
                            entry.rows_deleted = entry.rows_deleted.saturating_add(rows_touched);
                        }
                    }
                });
            }

            MetricsEvent::Plan { kind, path } => {
                metrics::with_state_mut(|m| {
                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    match path {
                        PathKind::Native => {
                            m.ops.plan_native = m.ops.plan_native.saturating_add(1);
                            entry.plan_native = entry.plan_native.saturating_add(1);
                        }
                        PathKind::InMemory => {
                            m.ops.plan_in_memory = m.ops.plan_in_memory.saturating_add(1);
                            entry.plan_in_memory = entry.plan_in_memory.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::TranslationRefused { kind: _, reason } => {
                metrics::with_state_mut(|m| {
                    let count = m.refusals.entry(reason.label().to_string()).or_default();
                    *count = count.saturating_add(1);
                });
            }

            MetricsEvent::RowsScanned { kind, rows_scanned } => {
                metrics::with_state_mut(|m| {
                    m.ops.rows_scanned = m.ops.rows_scanned.saturating_add(rows_scanned);
                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    entry.rows_scanned = entry.rows_scanned.saturating_add(rows_scanned);
                });
            }

            MetricsEvent::UniqueViolation { kind } => {
                metrics::with_state_mut(|m| {
                    m.ops.unique_violations = m.ops.unique_violations.saturating_add(1);
                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    entry.unique_violations = entry.unique_violations.saturating_add(1);
                });
            }

            MetricsEvent::CursorDisconnected { rows_buffered } => {
                metrics::with_state_mut(|m| {
                    m.ops.cursor_disconnects = m.ops.cursor_disconnects.saturating_add(1);
                    m.ops.rows_buffered = m.ops.rows_buffered.saturating_add(rows_buffered);
                });
            }

            MetricsEvent::CascadeApplied {
                kind,
                rows_deleted,
                references_nulled,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.cascade_deletes = m.ops.cascade_deletes.saturating_add(rows_deleted);
                    m.ops.cascade_nulls = m.ops.cascade_nulls.saturating_add(references_nulled);
                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    entry.cascade_deletes = entry.cascade_deletes.saturating_add(rows_deleted);
                });
            }

            MetricsEvent::CascadeRejected { kind } => {
                metrics::with_state_mut(|m| {
                    m.ops.cascade_rejections = m.ops.cascade_rejections.saturating_add(1);
                    let entry = m.kinds.entry(kind.to_string()).or_default();
                    entry.cascade_rejections = entry.cascade_rejections.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    // clone out so a sink may itself record without a re-entrant borrow
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state (counters + perf).
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// Span
///
/// RAII guard that emits start/finish metrics events for one engine call.
/// Ensures finish accounting happens even on unwind.
///

pub(crate) struct Span<'a> {
    exec: ExecKind,
    kind: &'a str,
    start: Instant,
    rows: u64,
    finished: bool,
}

impl<'a> Span<'a> {
    #[must_use]
    pub(crate) fn new(exec: ExecKind, kind: &'a str) -> Self {
        record(MetricsEvent::ExecStart { exec, kind });

        Self {
            exec,
            kind,
            start: Instant::now(),
            rows: 0,
            finished: false,
        }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }

    pub(crate) const fn add_rows(&mut self, rows: u64) {
        self.rows = self.rows.saturating_add(rows);
    }

    fn finish_inner(&self) {
        let elapsed_micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);

        record(MetricsEvent::ExecFinish {
            exec: self.exec,
            kind: self.kind,
            rows_touched: self.rows,
            elapsed_micros,
        });
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish_inner();
            self.finished = true;
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::Cell,
        panic::{AssertUnwindSafe, catch_unwind},
    };

    #[derive(Default)]
    struct CountingSink {
        calls: Cell<usize>,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: MetricsEvent<'_>) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    fn plan(path: PathKind) -> MetricsEvent<'static> {
        MetricsEvent::Plan {
            kind: "obs::tests::Entity",
            path,
        }
    }

    #[test]
    fn with_metrics_sink_routes_and_restores_nested_overrides() {
        SINK_OVERRIDE.with(|cell| {
            *cell.borrow_mut() = None;
        });

        let outer = Rc::new(CountingSink::default());
        let inner = Rc::new(CountingSink::default());

        // No override installed yet.
        record(plan(PathKind::Native));
        assert_eq!(outer.calls.get(), 0);

        with_metrics_sink(outer.clone(), || {
            record(plan(PathKind::Native));
            assert_eq!(outer.calls.get(), 1);

            with_metrics_sink(inner.clone(), || {
                record(plan(PathKind::InMemory));
            });

            // Inner override was restored to outer override.
            record(plan(PathKind::InMemory));
        });

        assert_eq!(outer.calls.get(), 2);
        assert_eq!(inner.calls.get(), 1);

        SINK_OVERRIDE.with(|cell| {
            assert!(cell.borrow().is_none());
        });
    }

    #[test]
    fn with_metrics_sink_restores_override_on_panic() {
        SINK_OVERRIDE.with(|cell| {
            *cell.borrow_mut() = None;
        });

        let sink = Rc::new(CountingSink::default());
        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(sink.clone(), || {
                record(plan(PathKind::Native));
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();

        assert!(panicked);
        assert_eq!(sink.calls.get(), 1);
        SINK_OVERRIDE.with(|cell| {
            assert!(cell.borrow().is_none());
        });
    }

    #[test]
    fn span_records_start_and_finish() {
        metrics_reset_all();

        {
            let mut span = Span::new(ExecKind::Query, "Person");
            span.set_rows(2);
            span.add_rows(1);
        }

        let counters = metrics_report(None)
            .counters
            .expect("metrics report should include counters");
        assert_eq!(counters.ops.query_calls, 1);
        assert_eq!(counters.ops.rows_returned, 3);

        let person = counters.kinds.get("Person").expect("kind counters");
        assert_eq!(person.query_calls, 1);
        assert_eq!(person.rows_returned, 3);
    }

    #[test]
    fn refusals_are_counted_by_reason() {
        metrics_reset_all();

        record(MetricsEvent::TranslationRefused {
            kind: "Person",
            reason: RefusalReason::Disjunction,
        });
        record(MetricsEvent::TranslationRefused {
            kind: "Person",
            reason: RefusalReason::Disjunction,
        });
        record(MetricsEvent::TranslationRefused {
            kind: "Pet",
            reason: RefusalReason::Subquery,
        });

        let counters = metrics_report(None)
            .counters
            .expect("metrics report should include counters");
        assert_eq!(counters.refusals.get("disjunction"), Some(&2));
        assert_eq!(counters.refusals.get("subquery"), Some(&1));
    }

    #[test]
    fn metrics_report_window_start_after_window_returns_empty() {
        metrics_reset_all();
        let window_start = metrics::with_state(|m| m.window_start_ms);
        record(plan(PathKind::Native));

        let report = metrics_report(Some(window_start.saturating_add(1)));
        assert!(report.counters.is_none());
        assert!(report.kind_counters.is_empty());

        let report = metrics_report(Some(window_start));
        assert!(report.counters.is_some());
    }
}
