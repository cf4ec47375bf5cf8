//! ## Crate layout
//! - `core`: keys, values, class metadata, query execution, the write path,
//!   delete cascades, configuration, and observability.
//! - `engine`: configured facade over the core entry points.
//! - `error`: stable public error taxonomy.
//!
//! The `prelude` module carries the vocabulary needed to build queries,
//! object graphs, and class metadata.

pub use arbor_core as core;

pub mod engine;
pub mod error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use engine::Engine;
pub use error::{Error, ErrorKind, ErrorOrigin};

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Engine, Error,
        core::{
            config::EngineConfig,
            db::{
                cascade::RowState,
                query::{
                    CompareOp, Direction, ExecutionPreference, FieldExpr, Filter, OrderSpec,
                    Parameters, QueryCompilation,
                },
                row::Row,
                scope::{ConnectionScope, ScopeEvent},
                store::{MemoryStore, StoreClient},
                write::PendingObject,
            },
            key::{Key, KeyId},
            model::{ClassModel, FieldModel, ModelRegistry, RelationModel},
            value::Value,
        },
    };
}
