//! Error types for the Weft framework.

use thiserror::Error;
use weft_core::{StoreError, TransportError};

/// A command definition that could not be compiled into a matcher.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// An argument fragment or passive pattern is not a valid regex.
    #[error("command '{command}' has an invalid pattern: {source}")]
    InvalidPattern {
        /// Syntax of the active command or name of the passive command.
        command: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The syntax template contains no tokens.
    #[error("command has an empty syntax")]
    EmptySyntax,
}

/// Errors raised when registering a plugin type.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("plugin '{name}' targets API version {found:#010x}, host provides {expected:#010x}")]
    IncompatibleApi {
        name: &'static str,
        found: u32,
        expected: u32,
    },

    #[error("plugin type '{0}' is already registered")]
    Duplicate(&'static str),
}

/// Errors a plugin reports from its lifecycle hooks.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Persisting the plugin's command spec failed.
    #[error("failed to persist command spec: {0}")]
    Spec(#[from] StoreError),

    /// A call to the homeserver failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The plugin's configuration section could not be decoded.
    #[error("invalid plugin config: {0}")]
    Config(#[from] serde_json::Error),

    /// Any other start failure.
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for plugin lifecycle hooks.
pub type PluginResult<T = ()> = Result<T, PluginError>;
