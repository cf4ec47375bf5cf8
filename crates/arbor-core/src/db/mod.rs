//! Query execution, write path, and delete cascades over a store client.

pub mod cascade;
pub mod query;
pub mod registry;
pub mod response;
pub mod row;
pub mod scope;
pub mod store;
pub mod write;

pub use cascade::{CascadeReport, DependentDeleteCascader, RowState};
pub use query::{QueryPlanner, QueryResult, QueryTranslator};
pub use registry::KeyRegistry;
pub use row::Row;
pub use scope::{ConnectionScope, ObjectHandle, ScopeEvent, ScopeId};
pub use store::{StoreClient, StoreCursor, StoreError};
pub use write::{GraphWriter, PendingObject};
