//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kubedemo_core::{ConsoleReporter, JsonReporter, QuietReporter, SharedReporter, Workflow};

use crate::error::{CliError, Result};

pub mod run;
pub mod validate;

/// How progress is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Console { verbose: bool, colors: bool },
    Quiet,
    Json,
}

impl Output {
    pub fn from_flags(json: bool, quiet: bool, verbose: bool, no_color: bool) -> Self {
        if json {
            Output::Json
        } else if quiet {
            Output::Quiet
        } else {
            Output::Console {
                verbose,
                colors: !no_color,
            }
        }
    }

    pub fn reporter(self) -> SharedReporter {
        match self {
            Output::Json => Arc::new(JsonReporter::new()),
            Output::Quiet => Arc::new(QuietReporter::new()),
            Output::Console { verbose, colors } => {
                let reporter = ConsoleReporter::new().with_colors(colors);
                if verbose {
                    Arc::new(reporter.verbose())
                } else {
                    Arc::new(reporter)
                }
            }
        }
    }
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub deadline: Option<Duration>,
    pub output: Output,
}

impl RunOptions {
    /// Load the workflow file and apply command-line overrides
    pub fn load_workflow(&self) -> Result<Workflow> {
        let mut workflow = Workflow::load_from(&self.file)?;
        if let Some(namespace) = &self.namespace {
            workflow
                .set_namespace(namespace.clone())
                .map_err(|_| CliError::Usage {
                    message: format!("--namespace '{}' is not a valid DNS-1123 label", namespace),
                })?;
        }
        Ok(workflow)
    }
}
