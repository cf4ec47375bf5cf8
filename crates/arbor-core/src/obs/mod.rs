//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Diagnostic logging goes through `tracing` at the call sites; counters flow
//! through the sink boundary defined here.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventPerf, EventReport, EventState, KindCounters, KindSummary};
pub use sink::{
    ExecKind, MetricsEvent, MetricsSink, PathKind, metrics_report, metrics_reset_all,
    with_metrics_sink,
};
