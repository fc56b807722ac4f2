//! Error types for kubedemo-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type for kubedemo-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type for declarative API client calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors raised while building or running a workflow
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Condition constructed with an unusable timeout/interval pair
    #[error("invalid condition '{description}': {reason}")]
    InvalidCondition { description: String, reason: String },

    /// Workflow file could not be interpreted
    #[error("invalid workflow '{}': {message}", path.display())]
    InvalidWorkflow { path: PathBuf, message: String },

    /// A manifest referenced by the workflow does not exist
    #[error("manifest not found: {}\nHint: paths are resolved relative to the workflow file", .0.display())]
    ManifestNotFound(PathBuf),

    /// Declarative API failure that could not be absorbed as a probe result
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Workflow-wide deadline elapsed
    #[error("workflow exceeded its deadline of {0}")]
    DeadlineExceeded(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

/// Errors reported by a [`DeclarativeClient`](crate::client::DeclarativeClient)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiError {
    /// Target object does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// API server could not be reached
    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    /// API server rejected the request
    #[error("API error ({code}): {message}")]
    Status { code: u16, message: String },

    /// Kind is not served by the cluster
    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),

    /// Manifest payload could not be parsed
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Remote command could not be started or streamed
    #[error("exec failed: {0}")]
    Exec(String),

    /// Payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ApiError {
    /// Check if the target does not exist
    ///
    /// A kind the cluster no longer serves (a custom resource whose
    /// definition was deleted) cannot have instances, so it counts as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound(_) | ApiError::UnknownKind(_) | ApiError::Status { code: 404, .. }
        )
    }

    /// Check if this error is likely to clear up on retry
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Unreachable(_) | ApiError::Exec(_) => true,
            ApiError::Status { code, .. } => *code == 409 || *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(ApiError::NotFound("Deployment/web".to_string()).is_not_found());
        assert!(
            ApiError::Status {
                code: 404,
                message: "gone".to_string()
            }
            .is_not_found()
        );
        assert!(!ApiError::Unreachable("refused".to_string()).is_not_found());
    }

    #[test]
    fn test_unknown_kind_counts_as_absent() {
        let err = ApiError::UnknownKind("example.com/v1/Widget".to_string());
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_detection() {
        assert!(ApiError::Unreachable("refused".to_string()).is_transient());
        assert!(
            ApiError::Status {
                code: 503,
                message: "unavailable".to_string()
            }
            .is_transient()
        );
        assert!(
            !ApiError::Status {
                code: 403,
                message: "forbidden".to_string()
            }
            .is_transient()
        );
        assert!(!ApiError::NotFound("Pod/x".to_string()).is_transient());
    }

    #[test]
    fn test_manifest_not_found_display() {
        let err = CoreError::ManifestNotFound(PathBuf::from("manifests/app.yaml"));
        let msg = err.to_string();
        assert!(msg.contains("manifests/app.yaml"));
        assert!(msg.contains("Hint"));
    }
}
