//! Error types for the entity model.

use tether_core::ClientId;
use tether_sync::SyncError;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in model operations.
///
/// Validation failures are not errors: they are recorded per attribute and
/// read back through [`Entity::errors`](crate::Entity::errors).
#[derive(Debug, Error)]
pub enum ModelError {
    /// A deleted entity was mutated.
    #[error("attempted to modify entity {client_id} after it was deleted")]
    MutationAfterDelete { client_id: ClientId },

    /// A fetch, save or destroy failed or was canceled.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl ModelError {
    /// Returns true if a sync operation was canceled rather than failed.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ModelError::Sync(err) if err.is_canceled())
    }
}
