//! In-memory declarative client for testing
//!
//! Holds objects in a map and lets tests script what successive `get`,
//! `exec` and authorization calls observe, without a cluster.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{DeclarativeClient, ExecOutput};
use crate::error::{ApiError, ApiResult};
use crate::manifest::parse_manifest;
use crate::resource::{ResourceRef, ResourceState};

/// Scripted answer for one `get` call
#[derive(Debug, Clone)]
pub enum Observation {
    /// Report the object as missing
    Absent,
    /// Report the object with this state
    Present(Value),
    /// Fail the call
    Error(ApiError),
}

#[derive(Default)]
struct MockState {
    objects: HashMap<ResourceRef, Value>,
    observations: HashMap<ResourceRef, VecDeque<Observation>>,
    exec_results: HashMap<ResourceRef, VecDeque<ApiResult<ExecOutput>>>,
    exec_log: Vec<(ResourceRef, Vec<String>)>,
    grants: HashMap<(String, String, String, String), bool>,
    apply_error: Option<ApiError>,
    unreachable: bool,
    retired_kinds: HashSet<String>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub applies: usize,
    pub gets: usize,
    pub lists: usize,
    pub deletes: usize,
    pub patches: usize,
    pub execs: usize,
    pub authorization_checks: usize,
}

/// In-memory client for testing
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<RwLock<MockState>>,
    operations: Arc<RwLock<OperationCounts>>,
}

impl MockClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly
    pub fn insert(&self, resource: ResourceRef, value: Value) {
        self.state.write().unwrap().objects.insert(resource, value);
    }

    /// Whether an object is currently stored
    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.state.read().unwrap().objects.contains_key(resource)
    }

    /// Queue scripted answers for `get`; once drained, stored objects are served
    pub fn script(&self, resource: ResourceRef, observations: Vec<Observation>) {
        self.state
            .write()
            .unwrap()
            .observations
            .entry(resource)
            .or_default()
            .extend(observations);
    }

    /// Report `resource` missing for the first `polls` gets, then present
    pub fn absent_then_present(&self, resource: ResourceRef, polls: usize, value: Value) {
        let mut observations = vec![Observation::Absent; polls];
        observations.push(Observation::Present(value.clone()));
        self.script(resource.clone(), observations);
        self.insert(resource, value);
    }

    /// Queue results for `exec` into a pod; once drained, exec exits 0
    pub fn script_exec(&self, pod: ResourceRef, results: Vec<ApiResult<ExecOutput>>) {
        self.state
            .write()
            .unwrap()
            .exec_results
            .entry(pod)
            .or_default()
            .extend(results);
    }

    /// Commands passed to `exec`, in call order
    pub fn exec_log(&self) -> Vec<(ResourceRef, Vec<String>)> {
        self.state.read().unwrap().exec_log.clone()
    }

    /// Set the answer for an authorization check (default: denied)
    pub fn grant(&self, subject: &str, verb: &str, kind: &str, namespace: &str, allowed: bool) {
        self.state.write().unwrap().grants.insert(
            (
                subject.to_string(),
                verb.to_string(),
                kind.to_string(),
                namespace.to_string(),
            ),
            allowed,
        );
    }

    /// Make every subsequent `apply` fail
    pub fn fail_apply(&self, error: ApiError) {
        self.state.write().unwrap().apply_error = Some(error);
    }

    /// Stop serving `kind`, as after its CustomResourceDefinition is deleted.
    /// Stored objects of that kind are dropped.
    pub fn retire_kind(&self, kind: &str) {
        let mut state = self.state.write().unwrap();
        state.objects.retain(|r, _| r.kind != kind);
        state.retired_kinds.insert(kind.to_string());
    }

    /// Simulate a cluster that cannot be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap());
    }

    fn check_reachable(&self) -> ApiResult<()> {
        if self.state.read().unwrap().unreachable {
            Err(ApiError::Unreachable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_served(&self, kind: &str) -> ApiResult<()> {
        if self.state.read().unwrap().retired_kinds.contains(kind) {
            Err(ApiError::UnknownKind(kind.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeclarativeClient for MockClient {
    async fn apply(&self, manifest: &str, namespace: &str) -> ApiResult<Vec<ResourceRef>> {
        self.count(|ops| ops.applies += 1);
        self.check_reachable()?;
        if let Some(err) = self.state.read().unwrap().apply_error.clone() {
            return Err(err);
        }

        let objects = parse_manifest(manifest, namespace)?;
        let mut state = self.state.write().unwrap();
        Ok(objects
            .into_iter()
            .map(|obj| {
                state.objects.insert(obj.reference.clone(), obj.value);
                obj.reference
            })
            .collect())
    }

    async fn get(&self, resource: &ResourceRef) -> ApiResult<ResourceState> {
        self.count(|ops| ops.gets += 1);
        self.check_reachable()?;
        self.check_served(&resource.kind)?;

        let mut state = self.state.write().unwrap();
        let scripted = state
            .observations
            .get_mut(resource)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Observation::Absent) => Err(ApiError::NotFound(resource.to_string())),
            Some(Observation::Present(value)) => Ok(ResourceState::new(value)),
            Some(Observation::Error(err)) => Err(err),
            None => state
                .objects
                .get(resource)
                .cloned()
                .map(ResourceState::new)
                .ok_or_else(|| ApiError::NotFound(resource.to_string())),
        }
    }

    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ApiResult<Vec<ResourceState>> {
        self.count(|ops| ops.lists += 1);
        self.check_reachable()?;
        self.check_served(kind)?;

        let state = self.state.read().unwrap();
        let mut items: Vec<(&ResourceRef, &Value)> = state
            .objects
            .iter()
            .filter(|(r, _)| r.kind == kind)
            .filter(|(r, _)| namespace.is_none() || r.namespace.as_deref() == namespace)
            .filter(|(_, v)| label_selector.is_none_or(|s| labels_match(v, s)))
            .collect();
        items.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        Ok(items
            .into_iter()
            .map(|(_, v)| ResourceState::new(v.clone()))
            .collect())
    }

    async fn delete(&self, resource: &ResourceRef) -> ApiResult<()> {
        self.count(|ops| ops.deletes += 1);
        self.check_reachable()?;
        self.check_served(&resource.kind)?;
        self.state.write().unwrap().objects.remove(resource);
        Ok(())
    }

    async fn patch(&self, resource: &ResourceRef, patch: &Value) -> ApiResult<()> {
        self.count(|ops| ops.patches += 1);
        self.check_reachable()?;
        self.check_served(&resource.kind)?;

        let mut state = self.state.write().unwrap();
        let target = state
            .objects
            .get_mut(resource)
            .ok_or_else(|| ApiError::NotFound(resource.to_string()))?;
        merge_patch(target, patch);
        Ok(())
    }

    async fn exec(&self, pod: &ResourceRef, command: &[String]) -> ApiResult<ExecOutput> {
        self.count(|ops| ops.execs += 1);
        self.check_reachable()?;

        let mut state = self.state.write().unwrap();
        state.exec_log.push((pod.clone(), command.to_vec()));
        state
            .exec_results
            .get_mut(pod)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(ExecOutput::default()))
    }

    async fn authorization_check(
        &self,
        subject: &str,
        verb: &str,
        kind: &str,
        namespace: &str,
    ) -> ApiResult<bool> {
        self.count(|ops| ops.authorization_checks += 1);
        self.check_reachable()?;

        let key = (
            subject.to_string(),
            verb.to_string(),
            kind.to_string(),
            namespace.to_string(),
        );
        Ok(self
            .state
            .read()
            .unwrap()
            .grants
            .get(&key)
            .copied()
            .unwrap_or(false))
    }

    async fn ping(&self) -> ApiResult<String> {
        self.check_reachable()?;
        Ok("mock-v1.31".to_string())
    }
}

/// Equality-based label selector matching ("app=web,tier=front")
fn labels_match(value: &Value, selector: &str) -> bool {
    let labels = value.pointer("/metadata/labels");
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels
                .and_then(|l| l.get(k.trim()))
                .and_then(Value::as_str)
                == Some(v.trim()),
            None => labels.and_then(|l| l.get(term)).is_some(),
        })
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            if let Value::Object(map) = target {
                for (key, value) in entries {
                    if value.is_null() {
                        map.remove(key);
                    } else {
                        merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}
