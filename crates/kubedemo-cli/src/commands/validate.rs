//! Validate command - check a workflow file without a cluster

use console::style;

use super::{Output, RunOptions};
use crate::error::{CliError, Result};
use crate::exit_codes;

pub fn run(options: &RunOptions) -> Result<i32> {
    let workflow = options.load_workflow()?;
    let resources = workflow.managed_resources()?;
    let file = &workflow.file;

    if options.output == Output::Json {
        let summary = serde_json::json!({
            "type": "validation",
            "valid": true,
            "name": workflow.name(),
            "namespace": workflow.namespace(),
            "manifests": workflow.manifests.iter().map(|m| m.label.as_str()).collect::<Vec<_>>(),
            "resources": resources.iter().map(|r| r.key()).collect::<Vec<_>>(),
            "verify": file.verify.len(),
            "updates": file.updates.len(),
            "tests": file.tests.checks.len(),
        });
        let line = serde_json::to_string(&summary).map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", line);
        return Ok(exit_codes::SUCCESS);
    }
    if options.output == Output::Quiet {
        return Ok(exit_codes::SUCCESS);
    }

    println!(
        "{} Workflow {} is valid",
        style("✓").green().bold(),
        style(workflow.name()).cyan()
    );
    println!("  Namespace:  {}", style(workflow.namespace()).yellow());
    println!("  Manifests:  {}", workflow.manifests.len());
    for manifest in &workflow.manifests {
        println!("    {} {}", style("•").dim(), manifest.label);
    }
    println!("  Resources:  {}", resources.len());
    for resource in &resources {
        println!("    {} {}", style("•").dim(), resource);
    }

    let sections = [
        ("Verify", &file.verify),
        ("Tests", &file.tests.checks),
    ];
    for (title, checks) in sections {
        if checks.is_empty() {
            continue;
        }
        println!("  {}:", title);
        for check in checks {
            println!("    {} wait for {}", style("→").blue(), check.describe());
        }
    }
    for update in &file.updates {
        println!(
            "  {} {} ({} checks)",
            style("Update").bold(),
            update.display_name(),
            update.verify.len()
        );
    }
    if !file.port_forwards.is_empty() {
        println!("  Port-forwards: {}", file.port_forwards.len());
    }

    Ok(exit_codes::SUCCESS)
}
