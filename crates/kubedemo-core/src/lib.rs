//! Kubedemo Core - Convergence polling and phase orchestration for Kubernetes demos
//!
//! This crate provides the cluster-agnostic building blocks of a demo run:
//! - `ConditionPoller`: Fixed-interval polling of a predicate under a timeout
//! - `probes`: Existence, field, connectivity, authorization and readiness predicates
//! - `PhaseOrchestrator`: Ordered phases with required/best-effort policy and cancellation
//! - `StatusReporter`: Console, JSON, quiet and recording progress sinks
//! - `DeclarativeClient`: The narrow API surface the probes and phases talk to
//! - `Workflow`: Demo definitions loaded from YAML

pub mod check;
pub mod client;
pub mod condition;
pub mod context;
pub mod error;
pub mod manifest;
pub mod mock;
pub mod orchestrator;
pub mod phase;
pub mod phases;
pub mod poller;
pub mod probes;
pub mod reporter;
pub mod resource;
pub mod workflow;

pub use check::{Bounds, Check, Expectation};
pub use client::{DeclarativeClient, ExecOutput, SharedClient};
pub use condition::{Condition, PollOutcome, Predicate, from_fn};
pub use context::{CancellationFlag, ExecutionContext, ProcessRegistry};
pub use error::{ApiError, ApiResult, CoreError, Result};
pub use manifest::{ManifestObject, parse_manifest};
pub use mock::{MockClient, Observation, OperationCounts};
pub use orchestrator::{OrchestratorState, PhaseOrchestrator, PhaseRecord, WorkflowOutcome};
pub use phase::{Phase, PhaseAction, PhaseResult};
pub use phases::{
    ApplyAction, ChecksAction, CleanupAction, ManifestSource, PatchAction, SequenceAction,
    StatusAction,
};
pub use poller::ConditionPoller;
pub use reporter::{
    ConsoleReporter, JsonReporter, Level, QuietReporter, RecordingReporter, SharedReporter,
    StatusReporter,
};
pub use resource::{ResourceRef, ResourceState};
pub use workflow::{DEFAULT_WORKFLOW_FILE, PortForwardSpec, UpdateSpec, Workflow, WorkflowFile};
