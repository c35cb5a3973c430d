// error.rs — Error types for the schema and sync subsystems.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a tag schema.
///
/// Every variant is fatal at load time: a schema is accepted whole or not at all.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A rule has an empty (or whitespace-only) key.
    #[error("rule #{index} has an empty key")]
    EmptyKey { index: usize },

    /// Two rules share the same key.
    #[error("duplicate rule key '{key}'")]
    DuplicateKey { key: String },

    /// The requirement level is not one of mandatory/conditional/recommended.
    #[error("rule '{key}' has unknown requirement '{value}'")]
    UnknownRequirement { key: String, value: String },

    /// The dependency predicate is missing, empty, or attached to the wrong tier.
    #[error("rule '{key}' has a malformed dependency: {reason}")]
    MalformedDependency { key: String, reason: String },

    /// An allowed value is listed twice for the same rule.
    #[error("rule '{key}' lists allowed value '{value}' more than once")]
    DuplicateAllowedValue { key: String, value: String },

    /// The schema document could not be parsed.
    #[error("failed to parse schema: {0}")]
    Parse(String),

    /// The schema could not be rendered for saving.
    #[error("failed to serialize schema: {0}")]
    Serialize(String),

    /// Reading or writing a schema file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<serde_yaml::Error> for SchemaError {
    fn from(err: serde_yaml::Error) -> Self {
        SchemaError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Parse(err.to_string())
    }
}

/// Errors raised while publishing an external policy document.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize policy document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The policy name cannot be used as a file name.
    #[error("invalid policy name '{name}': {reason}")]
    InvalidPolicyName { name: String, reason: String },
}
