//! Declarative API client interface
//!
//! Everything kubedemo knows about the target cluster goes through this
//! trait. The kube-rs implementation lives in `kubedemo-kube`; tests use
//! [`MockClient`](crate::mock::MockClient).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::resource::{ResourceRef, ResourceState};

/// Client handle shared by probes and phases
pub type SharedClient = Arc<dyn DeclarativeClient>;

/// Captured result of a command run inside a pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (0 for success)
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations against a remote declarative system
///
/// Implementations must be Send + Sync so a single client can be shared
/// between every probe of a workflow.
#[async_trait]
pub trait DeclarativeClient: Send + Sync {
    /// Create or update every object of a (multi-document) YAML manifest.
    /// Namespaced objects without a namespace land in `namespace`.
    async fn apply(&self, manifest: &str, namespace: &str) -> ApiResult<Vec<ResourceRef>>;

    /// Fetch the current observed state of an object
    async fn get(&self, resource: &ResourceRef) -> ApiResult<ResourceState>;

    /// List objects of a kind, optionally filtered by a label selector
    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ApiResult<Vec<ResourceState>>;

    /// Delete an object. Absence of the target is not an error.
    async fn delete(&self, resource: &ResourceRef) -> ApiResult<()>;

    /// Apply a JSON merge patch
    async fn patch(&self, resource: &ResourceRef, patch: &serde_json::Value) -> ApiResult<()>;

    /// Run a command inside a pod and capture its output
    async fn exec(&self, pod: &ResourceRef, command: &[String]) -> ApiResult<ExecOutput>;

    /// Ask whether `subject` may perform `verb` on `kind` in `namespace`
    async fn authorization_check(
        &self,
        subject: &str,
        verb: &str,
        kind: &str,
        namespace: &str,
    ) -> ApiResult<bool>;

    /// Verify the API server is reachable; returns its version string
    async fn ping(&self) -> ApiResult<String>;
}
