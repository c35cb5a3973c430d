// error.rs — Inventory listing errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by an inventory source.
///
/// The engine reports which kind of failure happened; retry policy belongs
/// to the caller.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Network hiccup, throttling, timeout. Retrying may succeed.
    #[error("transient inventory error: {message}")]
    Transient { message: String },

    /// Authorization failure, unknown account, bad cursor. Retrying won't help.
    #[error("permanent inventory error: {message}")]
    Permanent { message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse inventory snapshot: {0}")]
    Parse(String),
}

impl InventoryError {
    pub fn transient(message: impl Into<String>) -> Self {
        InventoryError::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        InventoryError::Permanent {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            InventoryError::Transient { .. } => true,
            InventoryError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            InventoryError::Permanent { .. } | InventoryError::Parse(_) => false,
        }
    }
}

impl From<serde_yaml::Error> for InventoryError {
    fn from(err: serde_yaml::Error) -> Self {
        InventoryError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Parse(err.to_string())
    }
}
