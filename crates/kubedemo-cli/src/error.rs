//! CLI error types with exit code handling
//!
//! Every failure that stops kubedemo before or outside the phase sequence
//! maps to one exit code; phase failures are reported by the orchestrator.

use std::path::PathBuf;

use kubedemo_core::CoreError;
use kubedemo_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Workflow file missing, unparseable or invalid
    #[error("Invalid workflow: {message}")]
    #[diagnostic(code(kubedemo::cli::workflow))]
    Workflow {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A manifest named by the workflow does not exist
    #[error("Manifest not found: {}", path.display())]
    #[diagnostic(
        code(kubedemo::cli::manifest),
        help("manifest paths are resolved relative to the workflow file")
    )]
    ManifestNotFound { path: PathBuf },

    /// Cluster could not be reached or configured
    #[error("Cluster unavailable: {message}")]
    #[diagnostic(
        code(kubedemo::cli::cluster),
        help("check that your kubeconfig points at a running cluster (kubectl cluster-info)")
    )]
    ClusterUnavailable { message: String },

    /// Invalid arguments
    #[error("{message}")]
    #[diagnostic(code(kubedemo::cli::usage))]
    Usage { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kubedemo::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(kubedemo::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Workflow { .. } => exit_codes::WORKFLOW_ERROR,
            CliError::ManifestNotFound { .. } => exit_codes::PRECONDITION_ERROR,
            CliError::ClusterUnavailable { .. } => exit_codes::PRECONDITION_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a workflow error
    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
            help: None,
        }
    }

    /// Create a cluster error
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::ClusterUnavailable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ManifestNotFound(path) => CliError::ManifestNotFound { path },
            CoreError::InvalidWorkflow { path, message } => CliError::Workflow {
                message: format!("{}: {}", path.display(), message),
                help: Some(
                    "run `kubedemo validate` to check the workflow without a cluster".to_string(),
                ),
            },
            CoreError::Api(e) => CliError::cluster(e.to_string()),
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::internal(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        CliError::cluster(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
