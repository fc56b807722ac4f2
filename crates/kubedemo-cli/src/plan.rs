//! Turn a workflow into the ordered phases of one invocation

use kubedemo_core::{
    ApplyAction, ChecksAction, CleanupAction, PatchAction, Phase, ResourceRef, SequenceAction,
    SharedClient, SharedReporter, StatusAction, Workflow,
};
use kubedemo_kube::PortForwardAction;

use crate::error::{CliError, Result};

/// Which part of the demo lifecycle to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// pre-clean, deploy, verify, updates, port-forward, test, status, teardown
    Full { keep: bool },
    /// pre-clean, deploy, verify
    Deploy,
    /// verify, port-forward, test against an existing deployment
    Test,
    /// status dump only
    Status,
    /// teardown only
    Cleanup,
}

/// Builds phases for a workflow against one client and reporter
pub struct Planner<'a> {
    workflow: &'a Workflow,
    client: SharedClient,
    reporter: SharedReporter,
    context: Option<String>,
}

impl<'a> Planner<'a> {
    pub fn new(workflow: &'a Workflow, client: SharedClient, reporter: SharedReporter) -> Self {
        Self {
            workflow,
            client,
            reporter,
            context: None,
        }
    }

    /// kubeconfig context for helpers that shell out to kubectl
    pub fn context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn phases(&self, mode: Mode) -> Result<Vec<Phase>> {
        let mut phases = Vec::new();
        match mode {
            Mode::Full { keep } => {
                phases.push(Phase::best_effort("pre-clean", self.cleanup()));
                phases.push(Phase::required("deploy", self.apply()));
                phases.push(Phase::required("verify", self.verify()));
                phases.extend(self.updates()?);
                phases.extend(self.port_forward());
                phases.extend(self.tests());
                phases.push(self.status());
                if !keep {
                    phases.push(Phase::best_effort("teardown", self.cleanup()));
                }
            }
            Mode::Deploy => {
                phases.push(Phase::best_effort("pre-clean", self.cleanup()));
                phases.push(Phase::required("deploy", self.apply()));
                phases.push(Phase::required("verify", self.verify()));
            }
            Mode::Test => {
                phases.push(Phase::required("verify", self.verify()));
                phases.extend(self.port_forward());
                phases.extend(self.tests());
            }
            Mode::Status => phases.push(self.status()),
            Mode::Cleanup => phases.push(Phase::required("cleanup", self.cleanup())),
        }
        Ok(phases)
    }

    /// Status phase run after an interrupt
    pub fn status(&self) -> Phase {
        Phase::best_effort(
            "status",
            StatusAction::new(
                self.client.clone(),
                self.reporter.clone(),
                self.workflow.file.status.clone(),
            ),
        )
    }

    fn cleanup(&self) -> CleanupAction {
        CleanupAction::new(self.client.clone(), self.reporter.clone())
            .bounds(self.workflow.defaults())
    }

    fn apply(&self) -> ApplyAction {
        ApplyAction::new(
            self.client.clone(),
            self.reporter.clone(),
            self.workflow.manifests.clone(),
        )
        .create_namespace(self.workflow.file.create_namespace)
    }

    fn verify(&self) -> ChecksAction {
        ChecksAction::new(
            self.client.clone(),
            self.reporter.clone(),
            self.workflow.file.verify.clone(),
        )
        .defaults(self.workflow.defaults())
    }

    fn updates(&self) -> Result<Vec<Phase>> {
        self.workflow
            .file
            .updates
            .iter()
            .map(|update| -> Result<Phase> {
                let target = ResourceRef::parse(&update.target).ok_or_else(|| {
                    CliError::workflow(format!(
                        "update target '{}' is not in Kind/name form",
                        update.target
                    ))
                })?;
                let action = SequenceAction::new()
                    .then(PatchAction::new(
                        self.client.clone(),
                        self.reporter.clone(),
                        vec![(target, update.patch.clone())],
                    ))
                    .then(
                        ChecksAction::new(
                            self.client.clone(),
                            self.reporter.clone(),
                            update.verify.clone(),
                        )
                        .defaults(self.workflow.defaults()),
                    );
                Ok(Phase::required(update.display_name(), action))
            })
            .collect()
    }

    fn port_forward(&self) -> Option<Phase> {
        let forwards = &self.workflow.file.port_forwards;
        if forwards.is_empty() {
            return None;
        }
        Some(Phase::required(
            "port-forward",
            PortForwardAction::new(self.reporter.clone(), forwards.clone())
                .context(self.context.clone()),
        ))
    }

    fn tests(&self) -> Option<Phase> {
        let tests = &self.workflow.file.tests;
        if tests.checks.is_empty() {
            return None;
        }
        let action = ChecksAction::new(
            self.client.clone(),
            self.reporter.clone(),
            tests.checks.clone(),
        )
        .defaults(self.workflow.defaults())
        .run_all();
        Some(if tests.required {
            Phase::required("test", action)
        } else {
            Phase::best_effort("test", action)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use kubedemo_core::{
        ExecutionContext, Level, MockClient, PhaseOrchestrator, RecordingReporter,
    };
    use tempfile::TempDir;

    const WORKFLOW: &str = r#"
name: rolling-update
namespace: rollout-demo
createNamespace: true
manifests: [web.yaml]
defaults: { timeout: 10s, interval: 1s }
verify:
  - exists: { kind: deploy, name: web }
updates:
  - name: scale up
    target: deploy/web
    patch: { spec: { replicas: 3 } }
    verify:
      - field: { kind: Deployment, name: web, path: spec.replicas, equals: 3 }
tests:
  required: false
  checks:
    - authorization: { subject: "system:serviceaccount:rollout-demo:web", verb: list, kind: pods }
status: [Deployment]
"#;

    const WEB: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
"#;

    fn load(workflow: &str) -> (TempDir, Workflow) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("web.yaml"), WEB).unwrap();
        let path: PathBuf = dir.path().join("kubedemo.yaml");
        std::fs::write(&path, workflow).unwrap();
        let workflow = Workflow::load_from(&path).unwrap();
        (dir, workflow)
    }

    fn rollout_deployment(generation: u64, observed: u64) -> serde_json::Value {
        serde_json::json!({
            "metadata": { "name": "web", "namespace": "rollout-demo", "generation": generation },
            "spec": { "replicas": 4 },
            "status": {
                "observedGeneration": observed,
                "replicas": 4,
                "updatedReplicas": 4,
                "readyReplicas": 4
            }
        })
    }

    fn names(phases: &[Phase]) -> Vec<&str> {
        phases.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_phase_lists() {
        let (_dir, workflow) = load(WORKFLOW);
        let planner = Planner::new(
            &workflow,
            Arc::new(MockClient::new()),
            Arc::new(RecordingReporter::new()),
        );

        let full = planner.phases(Mode::Full { keep: false }).unwrap();
        assert_eq!(
            names(&full),
            vec!["pre-clean", "deploy", "verify", "scale up", "test", "status", "teardown"]
        );
        let required: Vec<bool> = full.iter().map(|p| p.is_required()).collect();
        assert_eq!(required, vec![false, true, true, true, false, false, false]);

        let kept = planner.phases(Mode::Full { keep: true }).unwrap();
        assert_eq!(kept.last().map(|p| p.name()), Some("status"));

        assert_eq!(
            names(&planner.phases(Mode::Deploy).unwrap()),
            vec!["pre-clean", "deploy", "verify"]
        );
        assert_eq!(names(&planner.phases(Mode::Test).unwrap()), vec!["verify", "test"]);
        assert_eq!(names(&planner.phases(Mode::Status).unwrap()), vec!["status"]);

        let cleanup = planner.phases(Mode::Cleanup).unwrap();
        assert_eq!(names(&cleanup), vec!["cleanup"]);
        assert!(cleanup[0].is_required());
    }

    #[tokio::test]
    async fn test_full_run_against_mock_cluster() {
        let (_dir, workflow) = load(WORKFLOW);
        let mock = MockClient::new();
        mock.grant(
            "system:serviceaccount:rollout-demo:web",
            "list",
            "pods",
            "rollout-demo",
            true,
        );
        let reporter = Arc::new(RecordingReporter::new());
        let planner = Planner::new(&workflow, Arc::new(mock.clone()), reporter.clone());
        let phases = planner.phases(Mode::Full { keep: false }).unwrap();
        let mut ctx = ExecutionContext::new(workflow.namespace())
            .with_resources(workflow.managed_resources().unwrap());

        let outcome = PhaseOrchestrator::new(reporter.clone())
            .with_status_phase(planner.status())
            .run(&phases, &mut ctx)
            .await;

        assert!(outcome.success, "{:?}", outcome.phases);
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.phases.iter().all(|p| p.result.success));
        assert!(!mock.contains(&ResourceRef::namespaced("Deployment", "web", "rollout-demo")));
        assert!(!mock.contains(&ResourceRef::new("Namespace", "rollout-demo")));
        assert!(
            reporter
                .messages(Level::Info)
                .iter()
                .any(|m| m.starts_with("Deployment/web - "))
        );
        assert_eq!(mock.operation_counts().patches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_demo_waits_for_observed_generation() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/rolling-update/kubedemo.yaml");
        let workflow = Workflow::load_from(std::path::Path::new(path)).unwrap();
        let mock = MockClient::new();
        let web = ResourceRef::namespaced("Deployment", "web", "rollout-demo");
        let planner = Planner::new(
            &workflow,
            Arc::new(mock.clone()),
            Arc::new(RecordingReporter::new()),
        );
        let updates = planner.updates().unwrap();
        let rollout = updates
            .iter()
            .find(|p| p.name() == "roll out nginx 1.27")
            .unwrap();
        let mut ctx = ExecutionContext::new(workflow.namespace());

        // Replica counts still describe the previous ReplicaSet
        mock.insert(web.clone(), rollout_deployment(3, 2));
        assert!(!rollout.run(&mut ctx).await.success);

        mock.insert(web, rollout_deployment(3, 3));
        assert!(rollout.run(&mut ctx).await.success);
    }
}
