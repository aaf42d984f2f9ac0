//! Unified error types for the Weft core.
//!
//! Collaborator traits ([`Transport`](crate::Transport), [`Store`](crate::Store))
//! report failures through the enums defined here. Higher layers wrap them in
//! their own error types.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur while talking to the messaging backend.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The homeserver answered with a non-success status.
    #[error("homeserver returned {status} ({errcode}): {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Protocol error code, e.g. `M_UNKNOWN_TOKEN`.
        errcode: String,
        /// Human-readable error message.
        message: String,
    },

    /// The request never reached the homeserver.
    #[error("connection to {url} failed: {reason}")]
    ConnectionFailed {
        /// The URL that failed.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration (bad homeserver URL, missing token, ...).
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Returns `true` if the homeserver rejected the access token.
    pub fn is_unknown_token(&self) -> bool {
        matches!(self, Self::Http { errcode, .. } if errcode == "M_UNKNOWN_TOKEN")
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors that can occur in the persistence store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Record kind (`account`, `plugin`, ...).
        kind: &'static str,
        /// Record identifier.
        id: String,
    },

    /// A record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The storage backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
