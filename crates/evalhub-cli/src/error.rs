//! Error types for the CLI

use evalhub_runtime::{ConfigurationErrors, RuntimeError};

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] evalhub_common::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }
}

impl From<ConfigurationErrors> for Error {
    fn from(errors: ConfigurationErrors) -> Self {
        Error::Runtime(errors.into())
    }
}
