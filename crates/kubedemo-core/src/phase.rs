//! Workflow phases

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// Outcome of running one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub success: bool,
    pub message: String,
}

impl PhaseResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// The work a phase performs
#[async_trait]
pub trait PhaseAction: Send + Sync {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult;
}

/// One named, ordered step of a workflow
pub struct Phase {
    name: String,
    required: bool,
    action: Box<dyn PhaseAction>,
}

impl Phase {
    /// A phase whose failure halts the workflow
    pub fn required(name: impl Into<String>, action: impl PhaseAction + 'static) -> Self {
        Self {
            name: name.into(),
            required: true,
            action: Box::new(action),
        }
    }

    /// A phase whose failure only produces a warning
    pub fn best_effort(name: impl Into<String>, action: impl PhaseAction + 'static) -> Self {
        Self {
            name: name.into(),
            required: false,
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        self.action.run(ctx).await
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}
