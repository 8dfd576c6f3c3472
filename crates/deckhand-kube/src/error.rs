//! Error types for deckhand-kube

use thiserror::Error;

/// Result type for deckhand-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Classification of a failure, used for control flow instead of
/// inspecting messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource does not exist; selects the create branch
    NotFound,
    /// Network trouble, throttling or a server-side failure
    Transient,
    /// Validation, conflict or permission failures
    Permanent,
    /// Bad descriptor or configuration, detected before any cluster call
    Configuration,
}

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Invalid application descriptor
    #[error("invalid application descriptor: {0}")]
    InvalidDescriptor(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Secret encryption or decoding error
    #[error("secret crypto error: {0}")]
    Crypto(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A cluster call failed for a specific resource
    #[error("failed to {action} {slug}: {source}")]
    Resource {
        action: &'static str,
        slug: String,
        #[source]
        source: Box<KubeError>,
    },

    /// Some steps of a multi-resource operation failed
    #[error("{operation} failed for {} resource(s): {}", .failures.len(), .failures.join("; "))]
    PartialFailure {
        operation: String,
        failures: Vec<String>,
    },
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<deckhand_core::CoreError> for KubeError {
    fn from(e: deckhand_core::CoreError) -> Self {
        use deckhand_core::CoreError;
        match e {
            CoreError::Crypto { message } => KubeError::Crypto(message),
            CoreError::Io(io) => KubeError::Io(io),
            other => KubeError::InvalidDescriptor(other.to_string()),
        }
    }
}

impl KubeError {
    /// Build an API status error, as the API server would return it
    pub fn status(code: u16, reason: &str, message: impl Into<String>) -> Self {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: message.into(),
            reason: reason.to_string(),
            code,
        }))
    }

    /// Annotate this error with the action and resource it happened on
    pub fn for_resource(self, action: &'static str, slug: impl Into<String>) -> Self {
        KubeError::Resource {
            action,
            slug: slug.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => match resp.code {
                404 => ErrorKind::NotFound,
                408 | 429 => ErrorKind::Transient,
                code if code >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Permanent,
            },
            KubeError::Api(_) | KubeError::Io(_) => ErrorKind::Transient,
            KubeError::InvalidDescriptor(_) | KubeError::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            KubeError::Serialization(_)
            | KubeError::Crypto(_)
            | KubeError::PartialFailure { .. } => ErrorKind::Permanent,
            KubeError::Resource { source, .. } => source.kind(),
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            KubeError::Resource { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}
