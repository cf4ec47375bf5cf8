//! Query execution: translation to native scans, in-memory fallback
//! evaluation, planning, and result cursors.

mod ast;
mod compile;
mod cursor;
mod descriptor;
mod eval;
mod planner;
mod translate;

#[cfg(test)]
mod tests;

pub use ast::{CompareOp, Comparison, Direction, FieldExpr, Filter, Operand, OrderSpec};
pub use compile::{
    CandidateSource, ExecutionPreference, Extent, Parameters, QueryCompilation, QueryRange,
};
pub(crate) use cursor::CursorHandle;
pub use cursor::ResultCursor;
pub use descriptor::{NativeField, NativeFilter, NativeOp, NativeSort, ScanDescriptor};
pub(crate) use eval::sort_cmp;
pub use eval::Tri;
pub use planner::{QueryPlanner, QueryResult};
pub use translate::{QueryTranslator, RefusalReason, Translation};
