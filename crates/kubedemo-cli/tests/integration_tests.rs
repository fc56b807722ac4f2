//! Integration tests for cluster-independent CLI paths

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Helper to run kubedemo command
fn kubedemo(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_kubedemo"))
        .args(args)
        .env_remove("KUBEDEMO_WORKFLOW")
        .env_remove("KUBEDEMO_CONTEXT")
        // Never reach a real cluster from the test suite
        .env("KUBECONFIG", "/nonexistent/kubeconfig")
        .output()
        .expect("Failed to execute kubedemo")
}

/// Get the demos path
fn demos_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos")
}

const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
  selector:
    matchLabels: { app: web }
  template:
    metadata:
      labels: { app: web }
    spec:
      containers:
        - name: web
          image: nginx:1.27
"#;

fn write_workflow(dir: &Path, workflow: &str) -> String {
    std::fs::write(dir.join("web.yaml"), DEPLOYMENT).unwrap();
    let path = dir.join("kubedemo.yaml");
    std::fs::write(&path, workflow).unwrap();
    path.to_string_lossy().into_owned()
}

mod help {
    use super::*;

    #[test]
    fn test_help_succeeds() {
        let output = kubedemo(&["--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("deploy"));
        assert!(stdout.contains("cleanup"));
        assert!(stdout.contains("--deadline"));
    }

    #[test]
    fn test_version_succeeds() {
        let output = kubedemo(&["--version"]);
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("kubedemo"));
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        let output = kubedemo(&["--definitely-not-a-flag"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_bad_deadline_is_usage_error() {
        let output = kubedemo(&["status", "--deadline", "soon"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_json_conflicts_with_quiet() {
        let output = kubedemo(&["validate", "--json", "--quiet"]);
        assert_eq!(output.status.code(), Some(64));
    }
}

mod workflow_errors {
    use super::*;

    #[test]
    fn test_missing_workflow_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        let output = kubedemo(&["validate", "-f", &path.to_string_lossy()]);

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_invalid_workflow_exits_before_connecting() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(
            dir.path(),
            "name: demo\nnamespace: Not_A_Label\nmanifests: [web.yaml]\n",
        );

        for command in ["run", "deploy", "status"] {
            let output = kubedemo(&[command, "-f", &file]);
            assert_eq!(output.status.code(), Some(2), "command {}", command);
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert!(stderr.contains("Not_A_Label"), "{}", stderr);
        }
    }

    #[test]
    fn test_unparseable_workflow() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(dir.path(), "name: demo\nnamespace: [unclosed\n");

        let output = kubedemo(&["-f", &file]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_missing_manifest_is_precondition_failure() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(
            dir.path(),
            "name: demo\nnamespace: demo\nmanifests: [web.yaml, missing.yaml]\n",
        );

        let output = kubedemo(&["deploy", "-f", &file]);
        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("missing.yaml"), "{}", stderr);
    }

    #[test]
    fn test_unreachable_cluster_is_precondition_failure() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(
            dir.path(),
            "name: demo\nnamespace: demo\nmanifests: [web.yaml]\n",
        );

        let output = Command::new(env!("CARGO_BIN_EXE_kubedemo"))
            .args(["status", "-f", &file])
            .env("KUBECONFIG", "/nonexistent/kubeconfig")
            .env_remove("KUBERNETES_SERVICE_HOST")
            .env_remove("KUBERNETES_SERVICE_PORT")
            .env("HOME", dir.path())
            .output()
            .expect("Failed to execute kubedemo");

        assert_eq!(output.status.code(), Some(3));
    }
}

mod validate_command {
    use super::*;

    const WORKFLOW: &str = r#"
name: web-demo
namespace: web-demo
createNamespace: true
manifests: [web.yaml]
verify:
  - exists: { kind: deploy, name: web }
  - field: { kind: Deployment, name: web, path: status.readyReplicas, equalsField: spec.replicas }
tests:
  checks:
    - authorization: { subject: "system:serviceaccount:web-demo:default", verb: delete, kind: pods, expect: deny }
"#;

    #[test]
    fn test_validate_valid_workflow() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(dir.path(), WORKFLOW);

        let output = kubedemo(&["validate", "-f", &file, "--no-color"]);

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("web-demo is valid"));
        assert!(stdout.contains("Namespace/web-demo"));
        assert!(stdout.contains("web-demo/Deployment/web"));
    }

    #[test]
    fn test_validate_json_output() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(dir.path(), WORKFLOW);

        let output = kubedemo(&["validate", "-f", &file, "--json"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(stdout.trim()).expect("Output should be valid JSON");
        assert_eq!(json["valid"], true);
        assert_eq!(json["verify"], 2);
        assert_eq!(json["tests"], 1);
        assert_eq!(json["resources"][0], "Namespace/web-demo");
    }

    #[test]
    fn test_namespace_override() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(dir.path(), WORKFLOW);

        let output = kubedemo(&["validate", "-f", &file, "-n", "other", "--json"]);
        assert!(output.status.success());
        let json: serde_json::Value =
            serde_json::from_str(String::from_utf8_lossy(&output.stdout).trim()).unwrap();
        assert_eq!(json["namespace"], "other");

        let output = kubedemo(&["validate", "-f", &file, "-n", "Bad_Namespace"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_bundled_demos_validate() {
        for demo in ["network-policy", "rolling-update", "rbac"] {
            let file = format!("{}/{}/kubedemo.yaml", demos_path(), demo);
            let output = kubedemo(&["validate", "-f", &file, "--quiet"]);
            assert!(
                output.status.success(),
                "{}: {}",
                demo,
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }
}
