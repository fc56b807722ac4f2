//! Workflow files
//!
//! A workflow file describes one demo: which manifests to deploy, what
//! convergence to wait for, which functional checks to run and which
//! objects to show in the status dump.
//!
//! ```yaml
//! name: network-policy
//! namespace: netpol-demo
//! createNamespace: true
//! manifests: [manifests/]
//! defaults: { timeout: 120s, interval: 2s }
//! verify:
//!   - podReady: { selector: app=client, as: client }
//! tests:
//!   checks:
//!     - connectivity: { from: client, address: web, port: 80, expect: deny }
//! status: [Deployment, Pod, NetworkPolicy]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::check::{Bounds, Check};
use crate::error::{CoreError, Result};
use crate::manifest::parse_manifest;
use crate::phases::ManifestSource;
use crate::resource::ResourceRef;

/// File name looked up when no workflow path is given
pub const DEFAULT_WORKFLOW_FILE: &str = "kubedemo.yaml";

fn default_true() -> bool {
    true
}

fn default_status_kinds() -> Vec<String> {
    ["Deployment", "Pod", "Service"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Functional tests run after deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSection {
    /// Whether a failing test fails the workflow
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Default for TestSection {
    fn default() -> Self {
        Self {
            required: true,
            checks: Vec::new(),
        }
    }
}

/// A change applied after deployment, e.g. scaling or a rolling update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpec {
    #[serde(default)]
    pub name: Option<String>,
    /// "Kind/name" or shorthand like "deploy/web"
    pub target: String,
    /// JSON merge patch
    pub patch: Value,
    /// Checks that must hold after the patch
    #[serde(default)]
    pub verify: Vec<Check>,
}

impl UpdateSpec {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("update {}", self.target))
    }
}

/// A local port forwarded to a service or pod for HTTP checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardSpec {
    /// "svc/web" or "pod/web-0"
    pub target: String,
    pub local_port: u16,
    pub remote_port: u16,
}

/// Contents of a workflow file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFile {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub create_namespace: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Manifest files or directories, relative to the workflow file
    #[serde(default)]
    pub manifests: Vec<PathBuf>,
    /// Managed resources; derived from the manifests when empty
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub defaults: Bounds,
    #[serde(default)]
    pub verify: Vec<Check>,
    #[serde(default)]
    pub updates: Vec<UpdateSpec>,
    #[serde(default)]
    pub tests: TestSection,
    #[serde(default)]
    pub port_forwards: Vec<PortForwardSpec>,
    #[serde(default = "default_status_kinds")]
    pub status: Vec<String>,
}

impl WorkflowFile {
    /// Parse workflow YAML; enum-valued checks use the `- kind: {...}` form
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let de = serde_yaml::Deserializer::from_str(content);
        serde_yaml::with::singleton_map_recursive::deserialize(de)
    }

    /// Problems that make the workflow unusable, in file order
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("'name' must not be empty".to_string());
        }
        if !is_dns_label(&self.namespace) {
            problems.push(format!(
                "namespace '{}' is not a valid DNS-1123 label",
                self.namespace
            ));
        }
        if let Err(reason) = self.defaults.or(Bounds::standard()).check() {
            problems.push(format!("defaults: {}", reason));
        }
        for resource in &self.resources {
            if ResourceRef::parse(resource).is_none() {
                problems.push(format!("resource '{}' is not in Kind/name form", resource));
            }
        }

        let checks = self
            .verify
            .iter()
            .chain(self.tests.checks.iter())
            .chain(self.updates.iter().flat_map(|u| u.verify.iter()));
        for check in checks {
            if let Err(problem) = check.validate() {
                problems.push(problem);
            }
            if let Err(problem) = check.validate_bounds(self.defaults) {
                problems.push(problem);
            }
        }

        for update in &self.updates {
            if ResourceRef::parse(&update.target).is_none() {
                problems.push(format!(
                    "update target '{}' is not in Kind/name form",
                    update.target
                ));
            }
            if !update.patch.is_object() {
                problems.push(format!("patch for '{}' must be a mapping", update.target));
            }
        }
        for forward in &self.port_forwards {
            if ResourceRef::parse(&forward.target).is_none() {
                problems.push(format!(
                    "port-forward target '{}' is not in Kind/name form",
                    forward.target
                ));
            }
            if forward.local_port == 0 || forward.remote_port == 0 {
                problems.push(format!("port-forward to '{}' needs non-zero ports", forward.target));
            }
        }

        problems
    }
}

/// Kubernetes namespace naming rule
pub fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// A validated workflow with its manifests read from disk
#[derive(Debug, Clone)]
pub struct Workflow {
    pub file: WorkflowFile,
    pub path: PathBuf,
    pub manifests: Vec<ManifestSource>,
}

impl Workflow {
    /// Load, validate and read the manifests of a workflow file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::InvalidWorkflow {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let file = WorkflowFile::from_yaml(&content).map_err(|e| CoreError::InvalidWorkflow {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let problems = file.validate();
        if !problems.is_empty() {
            return Err(CoreError::InvalidWorkflow {
                path: path.to_path_buf(),
                message: problems.join("; "),
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut manifests = Vec::new();
        for entry in &file.manifests {
            manifests.extend(read_manifests(&base.join(entry))?);
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            manifests,
        })
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn namespace(&self) -> &str {
        &self.file.namespace
    }

    /// Run against a different namespace than the file names
    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        let namespace = namespace.into();
        if !is_dns_label(&namespace) {
            return Err(CoreError::InvalidWorkflow {
                path: self.path.clone(),
                message: format!("namespace '{}' is not a valid DNS-1123 label", namespace),
            });
        }
        self.file.namespace = namespace;
        Ok(())
    }

    /// Polling bounds for checks that set none
    pub fn defaults(&self) -> Bounds {
        self.file.defaults.or(Bounds::standard())
    }

    /// Resources the workflow manages, in apply order
    ///
    /// Listed resources win; otherwise every object in the manifests is
    /// managed. The namespace itself comes first when the workflow creates it.
    pub fn managed_resources(&self) -> Result<Vec<ResourceRef>> {
        let namespace = self.namespace();
        let mut resources = Vec::new();
        if self.file.create_namespace {
            resources.push(ResourceRef::new("Namespace", namespace));
        }

        if self.file.resources.is_empty() {
            for source in &self.manifests {
                let objects = parse_manifest(&source.content, namespace).map_err(|e| {
                    CoreError::InvalidWorkflow {
                        path: PathBuf::from(&source.label),
                        message: e.to_string(),
                    }
                })?;
                resources.extend(objects.into_iter().map(|obj| obj.reference));
            }
        } else {
            resources.extend(
                self.file
                    .resources
                    .iter()
                    .filter_map(|r| ResourceRef::parse(r))
                    .map(|r| r.or_namespace(namespace)),
            );
        }

        let mut unique = Vec::with_capacity(resources.len());
        for resource in resources {
            if !unique.contains(&resource) {
                unique.push(resource);
            }
        }
        Ok(unique)
    }
}

/// Read one manifest file, or every YAML file of a directory in name order
fn read_manifests(path: &Path) -> Result<Vec<ManifestSource>> {
    if !path.exists() {
        return Err(CoreError::ManifestNotFound(path.to_path_buf()));
    }

    let files = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    files
        .into_iter()
        .map(|file| -> Result<ManifestSource> {
            let content = std::fs::read_to_string(&file)?;
            Ok(ManifestSource::new(file.display().to_string(), content))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    const WORKFLOW: &str = r#"
name: network-policy
namespace: netpol-demo
createNamespace: true
manifests:
  - manifests/
defaults:
  timeout: 90s
verify:
  - exists: { kind: deploy, name: web }
  - podReady: { selector: app=client, as: client }
updates:
  - target: deploy/web
    patch: { spec: { replicas: 3 } }
    verify:
      - field: { kind: Deployment, name: web, path: status.readyReplicas, equals: 3 }
tests:
  required: false
  checks:
    - connectivity: { from: client, address: web, port: 80, expect: deny }
portForwards:
  - { target: svc/web, localPort: 8080, remotePort: 80 }
"#;

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
"#;

    const POLICY: &str = r#"
apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: deny-all
---
apiVersion: v1
kind: Service
metadata:
  name: web
"#;

    fn write_demo(workflow: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let manifests = dir.path().join("manifests");
        std::fs::create_dir(&manifests).unwrap();
        std::fs::write(manifests.join("01-web.yaml"), DEPLOYMENT).unwrap();
        std::fs::write(manifests.join("02-policy.yml"), POLICY).unwrap();
        std::fs::write(manifests.join("README.md"), "not a manifest").unwrap();
        let path = dir.path().join("kubedemo.yaml");
        std::fs::write(&path, workflow).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_workflow() {
        let (_dir, path) = write_demo(WORKFLOW);
        let workflow = Workflow::load_from(&path).unwrap();

        assert_eq!(workflow.name(), "network-policy");
        assert_eq!(workflow.manifests.len(), 2);
        assert!(workflow.manifests[0].label.ends_with("01-web.yaml"));
        assert!(!workflow.file.tests.required);
        assert_eq!(workflow.file.verify.len(), 2);
        assert_eq!(workflow.file.updates[0].display_name(), "update deploy/web");
        assert_eq!(workflow.file.port_forwards[0].local_port, 8080);
        assert_eq!(workflow.file.status, vec!["Deployment", "Pod", "Service"]);

        let defaults = workflow.defaults();
        assert_eq!(defaults.timeout, Some(Duration::from_secs(90)));
        assert_eq!(defaults.interval, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_managed_resources_from_manifests() {
        let (_dir, path) = write_demo(WORKFLOW);
        let workflow = Workflow::load_from(&path).unwrap();
        let resources = workflow.managed_resources().unwrap();

        let keys: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "Namespace/netpol-demo",
                "netpol-demo/Deployment/web",
                "netpol-demo/NetworkPolicy/deny-all",
                "netpol-demo/Service/web",
            ]
        );
    }

    #[test]
    fn test_listed_resources_follow_namespace_override() {
        let workflow_yaml = WORKFLOW.replace(
            "manifests:\n  - manifests/\n",
            "manifests:\n  - manifests/\nresources: [deploy/web, svc/web]\n",
        );
        let (_dir, path) = write_demo(&workflow_yaml);
        let mut workflow = Workflow::load_from(&path).unwrap();
        workflow.set_namespace("other").unwrap();

        let resources = workflow.managed_resources().unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[1], ResourceRef::namespaced("Deployment", "web", "other"));
        assert!(workflow.set_namespace("Bad_Name").is_err());
    }

    #[test]
    fn test_missing_manifest() {
        let (_dir, path) = write_demo(&WORKFLOW.replace("manifests/", "nowhere.yaml"));
        let err = Workflow::load_from(&path).unwrap_err();
        assert!(matches!(err, CoreError::ManifestNotFound(p) if p.ends_with("nowhere.yaml")));
    }

    #[test]
    fn test_invalid_workflow_reports_every_problem() {
        let yaml = r#"
name: ""
namespace: Not_Valid
resources: [web]
verify:
  - field: { kind: Deployment, name: web, path: spec.replicas }
"#;
        let (_dir, path) = write_demo(yaml);
        let err = Workflow::load_from(&path).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'name' must not be empty"));
        assert!(message.contains("Not_Valid"));
        assert!(message.contains("resource 'web'"));
        assert!(message.contains("exactly one of 'equals' or 'equalsField'"));
    }

    #[test]
    fn test_check_bounds_resolve_against_defaults() {
        let yaml = r#"
name: bounds
namespace: demo
defaults: { timeout: 30s }
verify:
  - exists: { kind: Pod, name: a, timeout: 1s, interval: 5s }
  - exists: { kind: Pod, name: b, interval: 60s }
  - connectivity: { from: client, address: web, port: 0 }
"#;
        let file = WorkflowFile::from_yaml(yaml).unwrap();
        let problems = file.validate();
        assert_eq!(problems.len(), 3, "{:?}", problems);
        assert!(problems[0].contains("Pod/a"));
        assert!(problems[1].contains("Pod/b"));
        assert!(problems[2].contains("non-zero port"));

        let zero =
            WorkflowFile::from_yaml("name: z\nnamespace: demo\ndefaults: { interval: 0s }")
                .unwrap();
        assert_eq!(
            zero.validate(),
            vec!["defaults: interval must be greater than zero".to_string()]
        );
    }

    #[test]
    fn test_unparseable_workflow() {
        let (_dir, path) = write_demo("name: [unclosed");
        let err = Workflow::load_from(&path).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorkflow { .. }));
    }

    #[test]
    fn test_dns_label() {
        assert!(is_dns_label("netpol-demo"));
        assert!(is_dns_label("a1"));
        assert!(!is_dns_label("-demo"));
        assert!(!is_dns_label("demo-"));
        assert!(!is_dns_label("Demo"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label(&"a".repeat(64)));
    }
}
