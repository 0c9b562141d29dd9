//! Error types shared across eval-hub crates
//!
//! Each variant carries enough context (file path, operation name) to make
//! the message actionable without a backtrace.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for shared eval-hub operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error [{source_name}]: {message}")]
    Config {
        /// Where the configuration came from (file path, env var)
        source_name: String,
        /// Description of what's wrong
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The document kind being (de)serialized, if known
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client")
        context: String,
    },
}

impl Error {
    /// Create a configuration error without a known source
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            source_name: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a configuration error attributed to a file or variable
    pub fn config_from(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            source_name: source_name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error for a specific document kind
    pub fn serialization_for(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with operation context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}
