//! Engine configuration.
//!
//! Loading (files, environment) belongs to the embedding application; this
//! module defines the typed shape, defaults, TOML parsing, and validation.

use crate::{
    db::query::ExecutionPreference,
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Default number of rows fetched per store round-trip by result cursors.
pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 20;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine config: {field} {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Configuration, ErrorOrigin::Config, err.to_string())
    }
}

///
/// EngineConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub query: QueryConfig,
    pub cascade: CascadeConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document. Missing tables and keys take
    /// their defaults; unknown keys are rejected.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.query.validate()
    }
}

///
/// QueryConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Applied when a query carries no preference of its own.
    pub execution: ExecutionPreference,
    pub cursor_batch_size: usize,

    /// Upper bound on rows pulled into memory for fallback evaluation.
    pub max_in_memory_candidates: Option<usize>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionPreference::Auto,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            max_in_memory_candidates: None,
        }
    }
}

impl QueryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cursor_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "query.cursor_batch_size",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.max_in_memory_candidates == Some(0) {
            return Err(ConfigError::Invalid {
                field: "query.max_in_memory_candidates",
                message: "must be greater than 0 when set".to_string(),
            });
        }

        Ok(())
    }
}

///
/// CascadeConfig
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CascadeConfig {
    pub join_relation: JoinRelationPolicy,
    pub cross_group: CrossGroupPolicy,
}

///
/// JoinRelationPolicy
///
/// Handling of many-to-one bidirectional fields stored through a join
/// representation, which have no defined cascade behavior.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRelationPolicy {
    /// Fail the delete before any mutation when such a field holds a value.
    #[default]
    Reject,
    /// Leave the field untouched and log a warning.
    Skip,
}

///
/// CrossGroupPolicy
///
/// Handling of cascades in a transactional scope that would touch rows
/// outside the owner's entity group.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossGroupPolicy {
    #[default]
    Reject,
    Warn,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config should parse");

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.query.cursor_batch_size, DEFAULT_CURSOR_BATCH_SIZE);
        assert_eq!(config.cascade.join_relation, JoinRelationPolicy::Reject);
    }

    #[test]
    fn full_document_parses() {
        let config = EngineConfig::from_toml_str(
            r#"
            [query]
            execution = "in_memory"
            cursor_batch_size = 5
            max_in_memory_candidates = 1000

            [cascade]
            join_relation = "skip"
            cross_group = "warn"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.query.execution, ExecutionPreference::InMemory);
        assert_eq!(config.query.cursor_batch_size, 5);
        assert_eq!(config.query.max_in_memory_candidates, Some(1000));
        assert_eq!(config.cascade.join_relation, JoinRelationPolicy::Skip);
        assert_eq!(config.cascade.cross_group, CrossGroupPolicy::Warn);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("[query]\nbatch = 3\n")
            .expect_err("unknown key must be rejected");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let err = EngineConfig::from_toml_str("[query]\ncursor_batch_size = 0\n")
            .expect_err("zero batch size must be rejected");

        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "query.cursor_batch_size",
                ..
            }
        ));

        let internal = InternalError::from(err);
        assert_eq!(internal.class, ErrorClass::Configuration);
        assert_eq!(internal.origin, ErrorOrigin::Config);
    }
}
