//! Resource references and observed resource state

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one object in the declarative system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource kind (e.g. "Deployment")
    pub kind: String,
    /// Object name
    pub name: String,
    /// Namespace, `None` for cluster-scoped kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    /// Create a cluster-scoped reference (or one whose namespace is filled in later)
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Create a namespaced reference
    pub fn namespaced(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Fill in the namespace when none is set
    pub fn or_namespace(mut self, namespace: &str) -> Self {
        if self.namespace.is_none() && !is_cluster_scoped(&self.kind) {
            self.namespace = Some(namespace.to_string());
        }
        self
    }

    /// Parse "Kind/name" (or "kind/name" shorthand such as "svc/web")
    pub fn parse(value: &str) -> Option<Self> {
        let (kind, name) = value.trim().split_once('/')?;
        if kind.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(expand_short_kind(kind), name))
    }

    /// Unique key in "Kind/name" form
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Kinds that never carry a namespace
pub fn is_cluster_scoped(kind: &str) -> bool {
    matches!(
        kind,
        "Namespace"
            | "PersistentVolume"
            | "StorageClass"
            | "ClusterRole"
            | "ClusterRoleBinding"
            | "CustomResourceDefinition"
            | "IngressClass"
            | "Node"
    )
}

/// Expand the kubectl short names used in demo workflows
pub fn expand_short_kind(kind: &str) -> String {
    match kind.to_ascii_lowercase().as_str() {
        "deploy" | "deployment" => "Deployment",
        "sts" | "statefulset" => "StatefulSet",
        "ds" | "daemonset" => "DaemonSet",
        "svc" | "service" => "Service",
        "po" | "pod" => "Pod",
        "cm" | "configmap" => "ConfigMap",
        "secret" => "Secret",
        "job" => "Job",
        "cj" | "cronjob" => "CronJob",
        "ing" | "ingress" => "Ingress",
        "netpol" | "networkpolicy" => "NetworkPolicy",
        "pv" | "persistentvolume" => "PersistentVolume",
        "pvc" | "persistentvolumeclaim" => "PersistentVolumeClaim",
        "sa" | "serviceaccount" => "ServiceAccount",
        "ns" | "namespace" => "Namespace",
        _ => return kind.to_string(),
    }
    .to_string()
}

/// Observed state of one object, as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceState {
    value: Value,
}

impl ResourceState {
    /// Wrap a raw JSON object
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Raw JSON
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Look up a dotted field path such as `status.readyReplicas` or
    /// `spec.ports.0.port`. A jsonpath-style `{.status.phase}` is accepted too.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let path = path
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .trim_start_matches('.');
        if path.is_empty() {
            return Some(&self.value);
        }

        path.split('.').try_fold(&self.value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Object kind
    pub fn kind(&self) -> Option<&str> {
        self.value.get("kind").and_then(Value::as_str)
    }

    /// Object name
    pub fn name(&self) -> Option<&str> {
        self.field("metadata.name").and_then(Value::as_str)
    }

    /// Object namespace
    pub fn namespace(&self) -> Option<&str> {
        self.field("metadata.namespace").and_then(Value::as_str)
    }

    /// Pod phase (Pending, Running, Succeeded...)
    pub fn phase(&self) -> Option<&str> {
        self.field("status.phase").and_then(Value::as_str)
    }

    /// Whether a Pod is Running with every container ready
    pub fn is_pod_ready(&self) -> bool {
        if self.phase() != Some("Running") {
            return false;
        }
        match self.field("status.containerStatuses").and_then(Value::as_array) {
            Some(statuses) if !statuses.is_empty() => statuses
                .iter()
                .all(|s| s.get("ready").and_then(Value::as_bool).unwrap_or(false)),
            _ => false,
        }
    }

    /// Ready/desired counts for workload kinds
    pub fn readiness(&self) -> Option<(i64, i64)> {
        let int = |path: &str| self.field(path).and_then(Value::as_i64);
        match self.kind()? {
            "Deployment" | "StatefulSet" | "ReplicaSet" => Some((
                int("status.readyReplicas").unwrap_or(0),
                int("spec.replicas").unwrap_or(1),
            )),
            "DaemonSet" => Some((
                int("status.numberReady").unwrap_or(0),
                int("status.desiredNumberScheduled").unwrap_or(0),
            )),
            "Job" => Some((
                int("status.succeeded").unwrap_or(0),
                int("spec.completions").unwrap_or(1),
            )),
            "Pod" => {
                let statuses = self
                    .field("status.containerStatuses")
                    .and_then(Value::as_array)?;
                let ready = statuses
                    .iter()
                    .filter(|s| s.get("ready").and_then(Value::as_bool).unwrap_or(false))
                    .count();
                Some((ready as i64, statuses.len() as i64))
            }
            _ => None,
        }
    }

    /// One-line summary used by the status dump
    pub fn summary(&self) -> String {
        let kind = self.kind().unwrap_or("?");
        let name = self.name().unwrap_or("?");
        let detail = match (self.readiness(), self.phase()) {
            (Some((ready, desired)), Some(phase)) => {
                format!("{}/{} ready, {}", ready, desired, phase)
            }
            (Some((ready, desired)), None) => format!("{}/{} ready", ready, desired),
            (None, Some(phase)) => phase.to_string(),
            (None, None) => "present".to_string(),
        };
        format!("{}/{} - {}", kind, name, detail)
    }
}

/// Render a scalar JSON value as text; objects and arrays have no scalar form
pub fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Compare an observed value against an expected one, treating `3` and `"3"` alike
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (render_scalar(actual), render_scalar(expected)) {
        (Some(a), Some(e)) => a == e,
        _ => false,
    }
}
