// error.rs — Remediation and tag-mutation errors.

use thiserror::Error;
use tg_inventory::InventoryError;

/// Failure reported by a [`crate::TagWriter`] for one resource.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("resource '{resource_id}' not found")]
    ResourceNotFound { resource_id: String },

    /// The backend refused the write (lock, policy, permissions).
    #[error("tag write to '{resource_id}' rejected: {reason}")]
    Rejected { resource_id: String, reason: String },

    #[error("I/O failure on '{resource_id}': {source}")]
    Io {
        resource_id: String,
        source: InventoryError,
    },
}

impl MutationError {
    pub fn resource_id(&self) -> &str {
        match self {
            MutationError::ResourceNotFound { resource_id }
            | MutationError::Rejected { resource_id, .. }
            | MutationError::Io { resource_id, .. } => resource_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemediationError {
    /// Another remediation for the same resource is in flight and the
    /// coordinator is configured to reject rather than wait.
    #[error("remediation already in progress for '{resource_id}'")]
    Conflict { resource_id: String },

    /// A blank placeholder would be read back as a missing tag.
    #[error("remediation placeholder must not be blank")]
    BlankPlaceholder,

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

impl RemediationError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemediationError::Conflict { .. })
    }
}
