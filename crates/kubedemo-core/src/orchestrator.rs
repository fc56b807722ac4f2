//! Phase sequencing with cooperative cancellation
//!
//! ```text
//! Idle ──run──▶ Running(0) ──▶ Running(1) ──▶ … ──▶ Done
//!                   │               │
//!                   └── cancelled ──┴──▶ Cancelled (status dump, kill helpers)
//! ```
//!
//! Cancellation is only observed at phase boundaries. A phase that is
//! polling when the signal arrives finishes its poll first.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::error::CoreError;
use crate::phase::{Phase, PhaseResult};
use crate::reporter::SharedReporter;

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrchestratorState {
    Idle,
    Running(usize),
    Cancelled,
    Done,
}

/// Result of one executed phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub name: String,
    pub required: bool,
    pub result: PhaseResult,
}

/// Result of a whole workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    /// Terminal state (`Done` or `Cancelled`)
    pub state: OrchestratorState,
    /// Overall success
    pub success: bool,
    /// Executed phases in order, including the status dump after a cancel
    pub phases: Vec<PhaseRecord>,
}

impl WorkflowOutcome {
    /// Process exit code: 0 on success, 1 on failure or interrupt
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }

    pub fn was_cancelled(&self) -> bool {
        self.state == OrchestratorState::Cancelled
    }

    /// Names of phases that ran, in order
    pub fn executed(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    /// The required phase that stopped the run, if any
    pub fn failed_phase(&self) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.required && !p.result.success)
    }
}

/// Runs phases in order and decides whether the workflow continues
pub struct PhaseOrchestrator {
    reporter: SharedReporter,
    state: OrchestratorState,
    status_phase: Option<Phase>,
    history: Vec<PhaseRecord>,
}

impl PhaseOrchestrator {
    pub fn new(reporter: SharedReporter) -> Self {
        Self {
            reporter,
            state: OrchestratorState::Idle,
            status_phase: None,
            history: Vec::new(),
        }
    }

    /// Phase run after a cancellation to show what the cluster looks like
    pub fn with_status_phase(mut self, phase: Phase) -> Self {
        self.status_phase = Some(phase);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Execute `phases` in order
    pub async fn run(&mut self, phases: &[Phase], ctx: &mut ExecutionContext) -> WorkflowOutcome {
        self.history.clear();
        let total = phases.len();
        let mut success = true;

        for (index, phase) in phases.iter().enumerate() {
            if ctx.is_cancelled() {
                return self.cancel(ctx).await;
            }

            self.state = OrchestratorState::Running(index);
            info!(phase = phase.name(), index, "starting phase");
            self.reporter.phase_started(phase.name(), index, total);

            let result = phase.run(ctx).await;
            self.report_result(phase, &result);
            let halt = !result.success && phase.is_required();
            self.history.push(PhaseRecord {
                name: phase.name().to_string(),
                required: phase.is_required(),
                result,
            });

            if halt {
                success = false;
                break;
            }
        }

        if success && ctx.is_cancelled() {
            return self.cancel(ctx).await;
        }

        self.finish(ctx, success).await
    }

    /// Execute `phases` with a workflow-wide deadline around the whole run
    pub async fn run_with_deadline(
        &mut self,
        phases: &[Phase],
        ctx: &mut ExecutionContext,
        deadline: Duration,
    ) -> WorkflowOutcome {
        let result = tokio::time::timeout(deadline, self.run(phases, ctx)).await;
        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = CoreError::DeadlineExceeded(format!("{}s", deadline.as_secs()));
                warn!(error = %err, "workflow deadline elapsed");
                self.reporter.error(&err.to_string());
                self.finish(ctx, false).await
            }
        }
    }

    fn report_result(&self, phase: &Phase, result: &PhaseResult) {
        if result.success {
            self.reporter.success(&result.message);
        } else if phase.is_required() {
            self.reporter
                .error(&format!("{} failed: {}", phase.name(), result.message));
        } else {
            self.reporter.warn(&format!(
                "{} did not succeed (continuing): {}",
                phase.name(),
                result.message
            ));
        }
    }

    async fn cancel(&mut self, ctx: &mut ExecutionContext) -> WorkflowOutcome {
        self.state = OrchestratorState::Cancelled;
        warn!("workflow interrupted");
        self.reporter.warn("Interrupted, collecting current status");

        if let Some(phase) = self.status_phase.as_ref() {
            let result = phase.run(ctx).await;
            if !result.success {
                self.reporter
                    .warn(&format!("status dump incomplete: {}", result.message));
            }
            self.history.push(PhaseRecord {
                name: phase.name().to_string(),
                required: false,
                result,
            });
        }

        self.terminate_processes(ctx).await;
        self.reporter.error("Workflow cancelled");

        WorkflowOutcome {
            state: self.state,
            success: false,
            phases: std::mem::take(&mut self.history),
        }
    }

    async fn finish(&mut self, ctx: &mut ExecutionContext, success: bool) -> WorkflowOutcome {
        self.state = OrchestratorState::Done;
        self.terminate_processes(ctx).await;

        let outcome = WorkflowOutcome {
            state: self.state,
            success,
            phases: std::mem::take(&mut self.history),
        };

        if success {
            self.reporter
                .success(&format!("All {} phases completed", outcome.phases.len()));
        } else if let Some(failed) = outcome.failed_phase() {
            self.reporter
                .error(&format!("Workflow stopped at phase '{}'", failed.name));
        }

        outcome
    }

    async fn terminate_processes(&self, ctx: &mut ExecutionContext) {
        if ctx.processes.is_empty() {
            return;
        }
        for label in ctx.processes.terminate_all().await {
            self.reporter.info(&format!("Stopped {}", label));
        }
    }
}
