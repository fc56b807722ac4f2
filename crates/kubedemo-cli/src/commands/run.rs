//! Run command - drive the workflow's phases against a live cluster

use std::sync::Arc;

use kubedemo_core::{
    DeclarativeClient, ExecutionContext, PhaseOrchestrator, SharedClient, WorkflowOutcome,
};
use kubedemo_kube::KubeClient;
use tracing::{debug, info};

use super::{Output, RunOptions};
use crate::error::{CliError, Result};
use crate::plan::{Mode, Planner};
use crate::shutdown::cancel_on_signal;

/// Run the phases selected by `mode`, returning the process exit code
pub async fn run(options: &RunOptions, mode: Mode) -> Result<i32> {
    // Everything that can be checked offline fails before we touch the cluster
    let workflow = options.load_workflow()?;
    let reporter = options.output.reporter();
    debug!(workflow = workflow.name(), ?mode, "loaded workflow");

    let client = KubeClient::connect(options.context.as_deref()).await?;
    let version = client
        .ping()
        .await
        .map_err(|e| CliError::cluster(e.to_string()))?;
    info!(%version, "connected to cluster");
    let client: SharedClient = Arc::new(client);

    reporter.info(&format!(
        "Workflow {} in namespace {} (server {})",
        workflow.name(),
        workflow.namespace(),
        version
    ));

    let planner =
        Planner::new(&workflow, client, reporter.clone()).context(options.context.clone());
    let phases = planner.phases(mode)?;

    let mut ctx =
        ExecutionContext::new(workflow.namespace()).with_resources(workflow.managed_resources()?);
    let signals = cancel_on_signal(ctx.cancellation(), reporter.clone(), ctx.processes.clone());

    let mut orchestrator = PhaseOrchestrator::new(reporter).with_status_phase(planner.status());
    let outcome = match options.deadline {
        Some(deadline) => orchestrator.run_with_deadline(&phases, &mut ctx, deadline).await,
        None => orchestrator.run(&phases, &mut ctx).await,
    };
    signals.abort();

    if options.output == Output::Json {
        print_outcome(&outcome)?;
    }
    Ok(outcome.exit_code())
}

fn print_outcome(outcome: &WorkflowOutcome) -> Result<()> {
    let event = serde_json::json!({
        "type": "outcome",
        "outcome": outcome,
        "exitCode": outcome.exit_code(),
    });
    let line = serde_json::to_string(&event).map_err(|e| CliError::internal(e.to_string()))?;
    println!("{}", line);
    Ok(())
}
