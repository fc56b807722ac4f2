//! Standard phase actions built on the client, poller and probes

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::check::{Bounds, Check};
use crate::client::SharedClient;
use crate::condition::Condition;
use crate::context::ExecutionContext;
use crate::phase::{PhaseAction, PhaseResult};
use crate::poller::ConditionPoller;
use crate::probes::AbsencePredicate;
use crate::reporter::SharedReporter;
use crate::resource::{ResourceRef, is_cluster_scoped};

/// A manifest payload and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    /// Shown in progress messages, usually the file path
    pub label: String,
    pub content: String,
}

impl ManifestSource {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// Render the manifest of a namespace object
pub fn namespace_manifest(namespace: &str) -> String {
    format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n", namespace)
}

/// Submits manifests and records the objects they describe
pub struct ApplyAction {
    client: SharedClient,
    reporter: SharedReporter,
    manifests: Vec<ManifestSource>,
    create_namespace: bool,
}

impl ApplyAction {
    pub fn new(
        client: SharedClient,
        reporter: SharedReporter,
        manifests: Vec<ManifestSource>,
    ) -> Self {
        Self {
            client,
            reporter,
            manifests,
            create_namespace: false,
        }
    }

    /// Create the target namespace before applying manifests
    pub fn create_namespace(mut self, create: bool) -> Self {
        self.create_namespace = create;
        self
    }
}

#[async_trait]
impl PhaseAction for ApplyAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        let mut sources = Vec::with_capacity(self.manifests.len() + 1);
        if self.create_namespace {
            sources.push(ManifestSource::new(
                format!("namespace {}", ctx.namespace),
                namespace_manifest(&ctx.namespace),
            ));
        }
        sources.extend(self.manifests.iter().cloned());

        let mut applied = 0usize;
        for source in &sources {
            self.reporter.info(&format!("Applying {}", source.label));
            match self.client.apply(&source.content, &ctx.namespace).await {
                Ok(refs) => {
                    for resource in refs {
                        debug!(resource = %resource, "applied");
                        self.reporter.info(&format!("  {} configured", resource.key()));
                        ctx.track_resource(resource);
                        applied += 1;
                    }
                }
                Err(e) => {
                    let message = format!("failed to apply {}: {}", source.label, e);
                    self.reporter.error(&message);
                    return PhaseResult::failed(message);
                }
            }
        }

        PhaseResult::ok(format!("applied {} resources", applied))
    }
}

/// Deletes every managed resource and waits until each one is gone
///
/// Already-absent resources count as deleted, so running cleanup twice
/// succeeds both times.
pub struct CleanupAction {
    client: SharedClient,
    poller: ConditionPoller,
    reporter: SharedReporter,
    bounds: Bounds,
}

impl CleanupAction {
    pub fn new(client: SharedClient, reporter: SharedReporter) -> Self {
        Self {
            client,
            poller: ConditionPoller::new(reporter.clone()),
            reporter,
            bounds: Bounds::standard(),
        }
    }

    /// Bounds used when waiting for deletions to finish
    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds.or(Bounds::standard());
        self
    }

    fn wait_bounds(&self) -> (Duration, Duration) {
        let standard = Bounds::standard();
        (
            self.bounds.timeout.or(standard.timeout).unwrap_or_default(),
            self.bounds.interval.or(standard.interval).unwrap_or_default(),
        )
    }
}

/// Reverse apply order, with cluster-scoped objects (namespaces) last
fn deletion_order(resources: &[ResourceRef]) -> Vec<ResourceRef> {
    let mut ordered: Vec<ResourceRef> = resources.iter().rev().cloned().collect();
    ordered.sort_by_key(|r| is_cluster_scoped(&r.kind));
    ordered
}

#[async_trait]
impl PhaseAction for CleanupAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        if ctx.resources.is_empty() {
            return PhaseResult::ok("nothing to clean up");
        }

        let mut failures = Vec::new();
        let mut deleted = Vec::new();
        for resource in deletion_order(&ctx.resources) {
            match self.client.delete(&resource).await {
                Ok(()) => deleted.push(resource),
                Err(e) if e.is_not_found() => debug!(resource = %resource, "already absent"),
                Err(e) => {
                    warn!(resource = %resource, error = %e, "delete failed");
                    failures.push(format!("{}: {}", resource.key(), e));
                }
            }
        }

        let (timeout, interval) = self.wait_bounds();
        for resource in deleted {
            let condition = match Condition::new(
                format!("{} to be deleted", resource.key()),
                AbsencePredicate::new(self.client.clone(), resource.clone()),
                timeout,
                interval,
            ) {
                Ok(condition) => condition,
                Err(e) => return PhaseResult::failed(e.to_string()),
            };

            let outcome = self.poller.wait(&condition).await;
            if outcome.met {
                self.reporter.info(&format!("Deleted {}", resource.key()));
            } else {
                failures.push(format!(
                    "{} still present after {}s",
                    resource.key(),
                    outcome.elapsed.as_secs()
                ));
            }
        }

        if failures.is_empty() {
            PhaseResult::ok(format!("removed {} resources", ctx.resources.len()))
        } else {
            for failure in &failures {
                self.reporter.warn(failure);
            }
            PhaseResult::failed(format!("cleanup incomplete: {}", failures.join("; ")))
        }
    }
}

/// Polls a list of checks in order
pub struct ChecksAction {
    client: SharedClient,
    poller: ConditionPoller,
    reporter: SharedReporter,
    checks: Vec<Check>,
    defaults: Bounds,
    fail_fast: bool,
}

impl ChecksAction {
    pub fn new(client: SharedClient, reporter: SharedReporter, checks: Vec<Check>) -> Self {
        Self {
            client,
            poller: ConditionPoller::new(reporter.clone()),
            reporter,
            checks,
            defaults: Bounds::standard(),
            fail_fast: true,
        }
    }

    /// Bounds for checks that set none of their own
    pub fn defaults(mut self, defaults: Bounds) -> Self {
        self.defaults = defaults.or(Bounds::standard());
        self
    }

    /// Keep evaluating after a failed check and report all failures at the end
    pub fn run_all(mut self) -> Self {
        self.fail_fast = false;
        self
    }
}

#[async_trait]
impl PhaseAction for ChecksAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        let mut passed = 0usize;
        let mut failures = Vec::new();

        for check in &self.checks {
            let built = match check.build(&self.client, ctx, self.defaults) {
                Ok(built) => built,
                Err(e) => {
                    self.reporter.error(&e.to_string());
                    return PhaseResult::failed(e.to_string());
                }
            };

            let description = built.condition.description().to_string();
            self.reporter.info(&format!("Waiting for {}", description));
            let outcome = self.poller.wait(&built.condition).await;

            if outcome.met {
                passed += 1;
                self.reporter.success(&format!(
                    "{} (after {}s)",
                    description,
                    outcome.elapsed.as_secs()
                ));
                if let Some((key, slot)) = built.discovery
                    && let Some(value) = slot.get()
                {
                    debug!(key = %key, value = %value, "discovered identifier");
                    ctx.remember(key, value);
                }
            } else {
                let message = format!(
                    "timed out after {}s waiting for {}",
                    outcome.elapsed.as_secs(),
                    description
                );
                self.reporter.error(&message);
                if self.fail_fast {
                    return PhaseResult::failed(message);
                }
                failures.push(description);
            }
        }

        if failures.is_empty() {
            PhaseResult::ok(format!("{} checks passed", passed))
        } else {
            PhaseResult::failed(format!(
                "{} of {} checks failed: {}",
                failures.len(),
                self.checks.len(),
                failures.join(", ")
            ))
        }
    }
}

/// Applies merge patches to existing objects
pub struct PatchAction {
    client: SharedClient,
    reporter: SharedReporter,
    patches: Vec<(ResourceRef, Value)>,
}

impl PatchAction {
    pub fn new(
        client: SharedClient,
        reporter: SharedReporter,
        patches: Vec<(ResourceRef, Value)>,
    ) -> Self {
        Self {
            client,
            reporter,
            patches,
        }
    }
}

#[async_trait]
impl PhaseAction for PatchAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        for (target, patch) in &self.patches {
            let target = target.clone().or_namespace(&ctx.namespace);
            self.reporter.info(&format!("Patching {}", target.key()));
            if let Err(e) = self.client.patch(&target, patch).await {
                let message = format!("failed to patch {}: {}", target.key(), e);
                self.reporter.error(&message);
                return PhaseResult::failed(message);
            }
        }
        PhaseResult::ok(format!("patched {} resources", self.patches.len()))
    }
}

/// Runs actions in order, stopping at the first failure
#[derive(Default)]
pub struct SequenceAction {
    actions: Vec<Box<dyn PhaseAction>>,
}

impl SequenceAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, action: impl PhaseAction + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[async_trait]
impl PhaseAction for SequenceAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        let mut last = PhaseResult::ok("nothing to do");
        for action in &self.actions {
            last = action.run(ctx).await;
            if !last.success {
                return last;
            }
        }
        last
    }
}

/// Reports the state of the demo's objects
pub struct StatusAction {
    client: SharedClient,
    reporter: SharedReporter,
    kinds: Vec<String>,
}

impl StatusAction {
    /// With no kinds, the managed resources are reported one by one
    pub fn new(client: SharedClient, reporter: SharedReporter, kinds: Vec<String>) -> Self {
        Self {
            client,
            reporter,
            kinds,
        }
    }

    async fn report_kinds(&self, ctx: &ExecutionContext) -> Vec<String> {
        let mut errors = Vec::new();
        for kind in &self.kinds {
            let namespace = (!is_cluster_scoped(kind)).then_some(ctx.namespace.as_str());
            match self.client.list(kind, namespace, None).await {
                Ok(items) if items.is_empty() => {
                    self.reporter.info(&format!("No {} found", kind));
                }
                Ok(items) => {
                    for item in items {
                        self.reporter.info(&item.summary());
                    }
                }
                Err(e) => {
                    self.reporter.warn(&format!("Could not list {}: {}", kind, e));
                    errors.push(kind.clone());
                }
            }
        }
        errors
    }

    async fn report_managed(&self, ctx: &ExecutionContext) -> Vec<String> {
        let mut errors = Vec::new();
        for resource in &ctx.resources {
            match self.client.get(resource).await {
                Ok(state) => self.reporter.info(&state.summary()),
                Err(e) if e.is_not_found() => {
                    self.reporter.info(&format!("{} - not found", resource.key()));
                }
                Err(e) => {
                    self.reporter.warn(&format!("Could not read {}: {}", resource.key(), e));
                    errors.push(resource.key());
                }
            }
        }
        errors
    }
}

#[async_trait]
impl PhaseAction for StatusAction {
    async fn run(&self, ctx: &mut ExecutionContext) -> PhaseResult {
        let errors = if self.kinds.is_empty() {
            self.report_managed(ctx).await
        } else {
            self.report_kinds(ctx).await
        };

        for (key, value) in &ctx.discovered {
            self.reporter.info(&format!("{} = {}", key, value));
        }
        for label in ctx.processes.labels() {
            self.reporter.info(&format!("Running: {}", label));
        }

        if errors.is_empty() {
            PhaseResult::ok("status reported")
        } else {
            PhaseResult::failed(format!("status incomplete for {}", errors.join(", ")))
        }
    }
}
