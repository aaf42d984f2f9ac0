//! Runtime error types.

use thiserror::Error;
use weft_core::{StoreError, TransportError};
use weft_framework::RegistryError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Plugin registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No transport factory was supplied and the HTTP transport is not compiled in.
    #[error("No transport available; enable the `http-client` feature or supply a factory")]
    NoTransport,

    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
