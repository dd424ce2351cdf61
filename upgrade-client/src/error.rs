//! Client error types
//!
//! Transport and idempotency errors are recovered locally where possible
//! (reconnect, cached-result replay) and only reach the caller once the
//! local budget is exhausted. Remote failures always propagate as values
//! so the presentation layer can offer a retry. Eligibility failures are
//! never errors at all; see `eligibility`.

use thiserror::Error;

use crate::store::StorageError;

/// Client error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport could not be established or dropped unexpectedly
    #[error("Connection error: {0}")]
    Connection(String),

    /// Attempted to send while no open connection exists
    #[error("Socket is not connected")]
    NotConnected,

    /// Reconnect budget exhausted; no further automatic retries
    #[error("Max reconnect attempts reached")]
    MaxReconnectAttempts,

    /// The idempotency check found this request already in flight
    #[error("Request is already in progress")]
    DuplicateRequest,

    /// The remote authority reported a failure (never cached, retry allowed)
    #[error("Remote request failed: {0}")]
    Remote(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for client operations
pub type SyncResult<T> = Result<T, SyncError>;
