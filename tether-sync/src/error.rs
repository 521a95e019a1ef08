//! Error types for the sync layer.

use crate::request::Operation;
use crate::transport::TransportResponse;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend answered with a non-2xx status.
    #[error("request failed with status {status}: {message}")]
    Status {
        status: u16,
        /// Error code from a JSON error body, or the numeric status.
        code: Option<String>,
        message: String,
    },

    /// The operation's cancel token was canceled before reconciliation.
    #[error("sync operation was canceled")]
    Canceled,

    /// The transport could not complete the exchange.
    #[error("transport error: {0}")]
    Transport(String),

    /// Nothing provided a URL for the operation.
    #[error("no url available to {0}")]
    MissingUrl(Operation),

    /// A payload could not be encoded for the wire.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Builds a [`SyncError::Status`] from a failed response.
    ///
    /// JSON error bodies of the form `{"message": .., "code": ..}` provide the
    /// message and code; anything else falls back to the status text.
    pub fn from_response(response: &TransportResponse) -> Self {
        let is_json = response
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            if let Ok(body) = serde_json::from_str::<serde_json::Value>(&response.body) {
                let message = match body.get("message") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => response.status_text.clone(),
                };
                let code = body.get("code").map(|c| match c {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                return SyncError::Status {
                    status: response.status,
                    code,
                    message,
                };
            }
        }
        SyncError::Status {
            status: response.status,
            code: Some(response.status.to_string()),
            message: response.status_text.clone(),
        }
    }

    /// Returns true if the operation was canceled rather than failed.
    pub fn is_canceled(&self) -> bool {
        matches!(self, SyncError::Canceled)
    }

    /// The HTTP status, for status failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
