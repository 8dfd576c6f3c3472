//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid application descriptor: {message}")]
    InvalidDescriptor { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secret crypto error: {message}")]
    Crypto { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl CoreError {
    /// Shorthand for an invalid descriptor error
    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Shorthand for a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        CoreError::Crypto {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
