//! Core runtime for Arbor: hierarchical keys, dynamic values, query
//! translation and evaluation, the object-graph write path, and delete
//! cascades, all over an external store client.

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod key;
pub mod model;
pub mod obs;
pub mod value;

///
/// Prelude
///
/// Domain vocabulary only. No errors, planners, or stores are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::row::Row,
        key::{Key, KeyId},
        model::{ClassModel, FieldModel, RelationKind, RelationModel},
        value::Value,
    };
}
