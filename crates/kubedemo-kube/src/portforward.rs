//! Background `kubectl port-forward` helpers
//!
//! Forwards are started as child processes and handed to the run's
//! process registry, which terminates them when the workflow ends or is
//! interrupted.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use kubedemo_core::{ExecutionContext, PhaseAction, PhaseResult, PortForwardSpec, SharedReporter};

use crate::error::KubeError;

/// Starts one `kubectl port-forward` per spec and tracks the processes
pub struct PortForwardAction {
    reporter: SharedReporter,
    forwards: Vec<PortForwardSpec>,
    kubectl: String,
    context: Option<String>,
    settle: Duration,
}

impl PortForwardAction {
    pub fn new(reporter: SharedReporter, forwards: Vec<PortForwardSpec>) -> Self {
        Self {
            reporter,
            forwards,
            kubectl: "kubectl".to_string(),
            context: None,
            settle: Duration::from_secs(2),
        }
    }

    /// kubectl binary to run
    pub fn kubectl(mut self, path: impl Into<String>) -> Self {
        self.kubectl = path.into();
        self
    }

    /// kubeconfig context passed to kubectl
    pub fn context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Grace period for the forwards to bind before the next phase
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn args(&self, spec: &PortForwardSpec, namespace: &str) -> Vec<String> {
        let mut args = vec![
            "port-forward".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            spec.target.clone(),
            format!("{}:{}", spec.local_port, spec.remote_port),
        ];
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }
}

/// Label used for the process registry and status output
pub fn forward_label(spec: &PortForwardSpec) -> String {
    format!(
        "port-forward {} {}:{}",
        spec.target, spec.local_port, spec.remote_port
    )
}

#[async_trait]
impl PhaseAction for PortForwardAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        for spec in &self.forwards {
            let args = self.args(spec, &ctx.namespace);
            debug!(command = %self.kubectl, ?args, "starting port-forward");

            let child = match Command::new(&self.kubectl)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    let message = KubeError::Kubectl(e).to_string();
                    self.reporter.error(&message);
                    return PhaseResult::failed(message);
                }
            };

            let label = forward_label(spec);
            self.reporter.info(&format!(
                "Forwarding localhost:{} -> {}:{}",
                spec.local_port, spec.target, spec.remote_port
            ));
            ctx.processes.track(label, child);
        }

        if !self.forwards.is_empty() {
            tokio::time::sleep(self.settle).await;
        }
        PhaseResult::ok(format!("{} port-forwards running", self.forwards.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kubedemo_core::{Level, RecordingReporter};

    fn spec() -> PortForwardSpec {
        PortForwardSpec {
            target: "svc/web".to_string(),
            local_port: 8080,
            remote_port: 80,
        }
    }

    #[test]
    fn test_args() {
        let action = PortForwardAction::new(Arc::new(RecordingReporter::new()), vec![spec()])
            .context(Some("kind-demo".to_string()));
        assert_eq!(
            action.args(&spec(), "demo"),
            vec![
                "port-forward",
                "-n",
                "demo",
                "svc/web",
                "8080:80",
                "--context",
                "kind-demo"
            ]
        );
        assert_eq!(forward_label(&spec()), "port-forward svc/web 8080:80");
    }

    #[tokio::test]
    async fn test_missing_kubectl_fails_phase() {
        let reporter = Arc::new(RecordingReporter::new());
        let action = PortForwardAction::new(reporter.clone(), vec![spec()])
            .kubectl("/nonexistent/kubectl");
        let mut ctx = ExecutionContext::new("demo");

        let result = action.run(&mut ctx).await;

        assert!(!result.success);
        assert!(result.message.contains("failed to start kubectl"));
        assert!(ctx.processes.is_empty());
        assert_eq!(reporter.messages(Level::Error).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forward_processes_are_tracked() {
        let action = PortForwardAction::new(Arc::new(RecordingReporter::new()), vec![spec()])
            .kubectl("sleep")
            .settle(Duration::from_millis(10));
        let mut ctx = ExecutionContext::new("demo");

        let result = action.run(&mut ctx).await;

        assert!(result.success);
        assert_eq!(ctx.processes.labels(), vec!["port-forward svc/web 8080:80"]);
        let terminated = ctx.processes.terminate_all().await;
        assert_eq!(terminated.len(), 1);
    }
}
