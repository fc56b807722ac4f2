//! Manifest payload handling
//!
//! Manifests are opaque payload for `apply`; the only thing kubedemo reads
//! from them is each document's identity, so cleanup knows what to delete.

use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::resource::{ResourceRef, is_cluster_scoped};

/// One object document of a manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestObject {
    /// Identity, with the default namespace already applied
    pub reference: ResourceRef,
    /// Full document as JSON
    pub value: Value,
}

/// Split a multi-document YAML stream on `---` separator lines,
/// dropping empty and comment-only documents
pub fn split_documents(manifest: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            push_document(&mut docs, std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_document(&mut docs, current);

    docs
}

fn push_document(docs: &mut Vec<String>, doc: String) {
    let has_content = doc
        .lines()
        .any(|l| !l.trim().is_empty() && !l.trim().starts_with('#'));
    if has_content {
        docs.push(doc);
    }
}

/// Parse every document and resolve its identity
pub fn parse_manifest(manifest: &str, default_namespace: &str) -> ApiResult<Vec<ManifestObject>> {
    split_documents(manifest)
        .iter()
        .enumerate()
        .map(|(index, doc)| {
            parse_document(doc, default_namespace).map_err(|e| {
                ApiError::InvalidManifest(format!("document {}: {}", index, e))
            })
        })
        .collect()
}

fn parse_document(doc: &str, default_namespace: &str) -> ApiResult<ManifestObject> {
    let value: Value = serde_yaml::from_str(doc)
        .map_err(|e| ApiError::InvalidManifest(format!("YAML parse error: {}", e)))?;

    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidManifest("missing kind".to_string()))?;
    if value.get("apiVersion").and_then(Value::as_str).is_none() {
        return Err(ApiError::InvalidManifest(format!("{} missing apiVersion", kind)));
    }

    let metadata = value.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidManifest(format!("{} missing metadata.name", kind)))?;

    let namespace = if is_cluster_scoped(kind) {
        None
    } else {
        Some(
            metadata
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str)
                .unwrap_or(default_namespace)
                .to_string(),
        )
    };

    Ok(ManifestObject {
        reference: ResourceRef {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace,
        },
        value,
    })
}
