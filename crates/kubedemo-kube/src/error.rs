//! Error types for kubedemo-kube

use kubedemo_core::ApiError;
use thiserror::Error;

/// Result type for kubedemo-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised while connecting to a cluster or starting helpers
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No usable kubeconfig or in-cluster configuration
    #[error("could not load cluster configuration: {0}\nHint: check KUBECONFIG or pass --context")]
    Config(String),

    /// kubectl could not be started
    #[error("failed to start kubectl: {0}\nHint: port forwarding needs kubectl on PATH")]
    Kubectl(#[source] std::io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<KubeError> for ApiError {
    fn from(e: KubeError) -> Self {
        match e {
            KubeError::Api(inner) => api_error(inner),
            other => ApiError::Unreachable(other.to_string()),
        }
    }
}

/// Map a kube-rs error onto the client-facing error type
pub fn api_error(e: kube::Error) -> ApiError {
    match e {
        kube::Error::Api(resp) if resp.code == 404 => ApiError::NotFound(resp.message),
        kube::Error::Api(resp) => ApiError::Status {
            code: resp.code,
            message: resp.message,
        },
        kube::Error::SerdeError(e) => ApiError::Serialization(e.to_string()),
        other => ApiError::Unreachable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn response(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {}", code),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err = api_error(response(404));
        assert!(err.is_not_found());
        assert!(matches!(err, ApiError::NotFound(_)));
        let err: ApiError = KubeError::Api(response(404)).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_status_codes_preserved() {
        let err = api_error(response(409));
        assert_eq!(
            err,
            ApiError::Status {
                code: 409,
                message: "status 409".to_string()
            }
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_config_error_is_unreachable() {
        let err: ApiError = KubeError::Config("no kubeconfig".to_string()).into();
        assert!(matches!(err, ApiError::Unreachable(msg) if msg.contains("no kubeconfig")));
    }
}
