//! Run-scoped execution state

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Child;
use tracing::{debug, warn};

use crate::resource::ResourceRef;

/// Cooperative cancellation flag
///
/// Cloned into the signal handler; the orchestrator reads it between phases.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A background helper process started during a phase
#[derive(Debug)]
pub struct TrackedProcess {
    /// What the process is for ("port-forward svc/web 8080:80")
    pub label: String,
    child: Child,
}

/// Registry of spawned child processes, terminated on cancellation or completion
///
/// Clones share the same set of processes, so the signal handler can kill
/// them while a phase still holds the context.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    processes: Arc<Mutex<Vec<TrackedProcess>>>,
}

impl ProcessRegistry {
    fn lock(&self) -> MutexGuard<'_, Vec<TrackedProcess>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of a running child
    pub fn track(&self, label: impl Into<String>, child: Child) {
        let label = label.into();
        debug!(process = %label, pid = ?child.id(), "tracking background process");
        self.lock().push(TrackedProcess { label, child });
    }

    /// Number of tracked processes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Labels of tracked processes
    pub fn labels(&self) -> Vec<String> {
        self.lock().iter().map(|p| p.label.clone()).collect()
    }

    /// Kill and reap every tracked process; returns the labels terminated
    pub async fn terminate_all(&self) -> Vec<String> {
        let processes = std::mem::take(&mut *self.lock());
        let mut terminated = Vec::with_capacity(processes.len());
        for mut process in processes {
            match process.child.kill().await {
                Ok(()) => debug!(process = %process.label, "terminated background process"),
                Err(e) => warn!(
                    process = %process.label,
                    error = %e,
                    "failed to terminate background process"
                ),
            }
            terminated.push(process.label);
        }
        terminated
    }
}

/// Mutable state shared by the phases of one workflow run
#[derive(Debug)]
pub struct ExecutionContext {
    /// Target namespace
    pub namespace: String,
    /// Resources the workflow manages (cleanup deletes these)
    pub resources: Vec<ResourceRef>,
    /// Identifiers discovered at runtime, e.g. pod names chosen by the cluster
    pub discovered: BTreeMap<String, String>,
    /// Background processes to terminate at the end of the run
    pub processes: ProcessRegistry,
    cancellation: CancellationFlag,
}

impl ExecutionContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            resources: Vec::new(),
            discovered: BTreeMap::new(),
            processes: ProcessRegistry::default(),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Register managed resources
    pub fn with_resources(mut self, resources: Vec<ResourceRef>) -> Self {
        for resource in resources {
            self.track_resource(resource);
        }
        self
    }

    /// Add a managed resource unless it is already known
    pub fn track_resource(&mut self, resource: ResourceRef) {
        let resource = resource.or_namespace(&self.namespace);
        if !self.resources.contains(&resource) {
            self.resources.push(resource);
        }
    }

    /// Handle for the signal handler
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Record an identifier discovered at runtime
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.discovered.insert(key.into(), value.into());
    }

    /// Look up a discovered identifier
    pub fn recall(&self, key: &str) -> Option<&str> {
        self.discovered.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag_shared() {
        let ctx = ExecutionContext::new("demo");
        let flag = ctx.cancellation();
        assert!(!ctx.is_cancelled());
        flag.cancel();
        flag.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_track_resource_dedups_and_namespaces() {
        let mut ctx = ExecutionContext::new("demo")
            .with_resources(vec![ResourceRef::new("Deployment", "web")]);
        ctx.track_resource(ResourceRef::namespaced("Deployment", "web", "demo"));
        ctx.track_resource(ResourceRef::new("PersistentVolume", "pv0"));

        assert_eq!(ctx.resources.len(), 2);
        assert_eq!(ctx.resources[0].namespace.as_deref(), Some("demo"));
        assert_eq!(ctx.resources[1].namespace, None);
    }

    #[test]
    fn test_discovered_identifiers() {
        let mut ctx = ExecutionContext::new("demo");
        ctx.remember("client", "client-7d9f-abc");
        assert_eq!(ctx.recall("client"), Some("client-7d9f-abc"));
        assert_eq!(ctx.recall("server"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_registry_terminates_children() {
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let registry = ProcessRegistry::default();
        let handle = registry.clone();
        registry.track("sleeper", child);
        assert_eq!(handle.labels(), vec!["sleeper"]);

        let terminated = handle.terminate_all().await;
        assert_eq!(terminated, vec!["sleeper".to_string()]);
        assert!(registry.is_empty());
    }
}
