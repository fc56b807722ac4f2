//! kube-rs implementation of the declarative client
//!
//! Key behaviors:
//! - Server-Side Apply with a dedicated field manager, objects applied dependencies-first
//! - Kinds resolved through API discovery, refreshed once when a kind is unknown
//!   (e.g. right after its CRD was applied)
//! - Exec over the WebSocket attach API
//! - Authorization answered by SubjectAccessReview, like `kubectl auth can-i --as`

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::{
    Client, Config,
    api::{
        Api, AttachParams, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
    },
    config::KubeConfigOptions,
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;
use tracing::{debug, info};

use kubedemo_core::manifest::split_documents;
use kubedemo_core::{
    ApiError, ApiResult, DeclarativeClient, ExecOutput, ResourceRef, ResourceState,
};

use crate::category::{ApplyOrder, api_group};
use crate::error::{KubeError, Result, api_error};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "kubedemo";

/// Declarative client backed by a live cluster
pub struct KubeClient {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl KubeClient {
    /// Connect using the current kubeconfig context, or `context` when given
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(name) => Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(name.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| KubeError::Config(e.to_string()))?,
            None => Config::infer()
                .await
                .map_err(|e| KubeError::Config(e.to_string()))?,
        };

        let client = Client::try_from(config)?;
        Self::with_client(client).await
    }

    /// Wrap an existing client; runs API discovery once
    pub async fn with_client(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    async fn refresh_discovery(&self) -> ApiResult<()> {
        debug!("refreshing API discovery");
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(api_error)?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    async fn resolve_gvk(
        &self,
        gvk: &GroupVersionKind,
    ) -> ApiResult<(ApiResource, ApiCapabilities)> {
        if let Some(found) = self.discovery.read().await.resolve_gvk(gvk) {
            return Ok(found);
        }
        self.refresh_discovery().await?;
        self.discovery
            .read()
            .await
            .resolve_gvk(gvk)
            .ok_or_else(|| ApiError::UnknownKind(format!("{}/{}", gvk.api_version(), gvk.kind)))
    }

    /// Resolve a kind, plural or short kind name ("Deployment", "deployments")
    async fn resolve_kind(&self, kind: &str) -> ApiResult<(ApiResource, ApiCapabilities)> {
        let lookup = |discovery: &Discovery| {
            find_kind(
                discovery
                    .groups()
                    .flat_map(|group| group.recommended_resources()),
                kind,
            )
        };

        if let Some(found) = lookup(&*self.discovery.read().await) {
            return Ok(found);
        }
        self.refresh_discovery().await?;
        lookup(&*self.discovery.read().await).ok_or_else(|| ApiError::UnknownKind(kind.to_string()))
    }

    fn api(
        &self,
        resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match (&capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, resource)
            }
            _ => Api::all_with(self.client.clone(), resource),
        }
    }

    async fn api_for(
        &self,
        resource: &ResourceRef,
    ) -> ApiResult<(Api<DynamicObject>, ApiResource)> {
        let (ar, caps) = self.resolve_kind(&resource.kind).await?;
        let api = self.api(&ar, &caps, resource.namespace.as_deref());
        Ok((api, ar))
    }
}

/// Convert TypeMeta to GroupVersionKind ("apps/v1" -> group "apps", version "v1")
fn gvk_of(types: &TypeMeta) -> GroupVersionKind {
    let version = types
        .api_version
        .rsplit_once('/')
        .map(|(_, v)| v)
        .unwrap_or(&types.api_version);
    GroupVersionKind::gvk(api_group(&types.api_version), version, &types.kind)
}

/// Pick the served resource for a kind name, core group first
fn find_kind(
    candidates: impl Iterator<Item = (ApiResource, ApiCapabilities)>,
    kind: &str,
) -> Option<(ApiResource, ApiCapabilities)> {
    let mut matches: Vec<(ApiResource, ApiCapabilities)> = candidates
        .filter(|(ar, _)| {
            ar.kind.eq_ignore_ascii_case(kind) || ar.plural.eq_ignore_ascii_case(kind)
        })
        .collect();
    matches.sort_by_key(|(ar, _)| (!ar.group.is_empty(), ar.group.clone()));
    matches.into_iter().next()
}

/// List responses omit apiVersion/kind on items; put them back
fn with_types(mut obj: DynamicObject, resource: &ApiResource) -> DynamicObject {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    obj
}

fn to_state(obj: DynamicObject, resource: &ApiResource) -> ApiResult<ResourceState> {
    let value = serde_json::to_value(with_types(obj, resource))
        .map_err(|e| ApiError::Serialization(e.to_string()))?;
    Ok(ResourceState::new(value))
}

/// Exit code from the status frame of an exec stream
///
/// Non-zero exits arrive as `reason: NonZeroExitCode` with the code in
/// `details.causes[reason=ExitCode].message`.
fn exit_code_of(status: &Status) -> i32 {
    if status.status.as_deref() == Some("Success") {
        return 0;
    }

    let from_causes = status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message.as_deref())
                .and_then(|m| m.trim().parse().ok())
        });

    from_causes
        .or_else(|| {
            status
                .reason
                .as_deref()
                .and_then(|r| r.strip_prefix("ExitCode:"))
                .and_then(|code| code.trim().parse().ok())
        })
        .unwrap_or(1)
}

/// Build the access review behind `kubectl auth can-i VERB RESOURCE --as SUBJECT`
fn access_review(
    subject: &str,
    verb: &str,
    group: &str,
    resource: &str,
    namespace: &str,
) -> SubjectAccessReview {
    let (resource, subresource) = match resource.split_once('/') {
        Some((resource, sub)) => (resource, Some(sub.to_string())),
        None => (resource, None),
    };

    // Service account identities also carry their implicit groups
    let groups = subject
        .strip_prefix("system:serviceaccount:")
        .and_then(|rest| rest.split_once(':'))
        .map(|(ns, _)| {
            vec![
                "system:serviceaccounts".to_string(),
                format!("system:serviceaccounts:{}", ns),
                "system:authenticated".to_string(),
            ]
        });

    SubjectAccessReview {
        spec: SubjectAccessReviewSpec {
            user: Some(subject.to_string()),
            groups,
            resource_attributes: Some(ResourceAttributes {
                namespace: Some(namespace.to_string()),
                verb: Some(verb.to_string()),
                group: Some(group.to_string()),
                resource: Some(resource.to_string()),
                subresource,
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader
        && let Err(e) = reader.read_to_end(&mut buf).await
    {
        debug!(error = %e, "exec stream ended early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

struct PendingApply {
    order: ApplyOrder,
    types: TypeMeta,
    obj: DynamicObject,
}

#[async_trait]
impl DeclarativeClient for KubeClient {
    async fn apply(&self, manifest: &str, namespace: &str) -> ApiResult<Vec<ResourceRef>> {
        let mut pending = Vec::new();
        for (index, doc) in split_documents(manifest).iter().enumerate() {
            let obj: DynamicObject = serde_yaml::from_str(doc).map_err(|e| {
                ApiError::InvalidManifest(format!("document {}: YAML parse error: {}", index, e))
            })?;
            let types = obj.types.clone().ok_or_else(|| {
                ApiError::InvalidManifest(format!("document {}: missing apiVersion or kind", index))
            })?;
            pending.push(PendingApply {
                order: ApplyOrder::of(&types.kind, &types.api_version),
                types,
                obj,
            });
        }
        pending.sort_by_key(|p| p.order);

        let params = PatchParams::apply(FIELD_MANAGER).force();
        let mut applied = Vec::with_capacity(pending.len());
        for PendingApply { types, mut obj, .. } in pending {
            let (ar, caps) = self.resolve_gvk(&gvk_of(&types)).await?;
            let name = obj.metadata.name.clone().ok_or_else(|| {
                ApiError::InvalidManifest(format!("{} missing metadata.name", types.kind))
            })?;

            let target_namespace = match caps.scope {
                Scope::Namespaced => Some(
                    obj.metadata
                        .namespace
                        .get_or_insert_with(|| namespace.to_string())
                        .clone(),
                ),
                Scope::Cluster => {
                    obj.metadata.namespace = None;
                    None
                }
            };

            let api = self.api(&ar, &caps, target_namespace.as_deref());
            api.patch(&name, &params, &Patch::Apply(&obj))
                .await
                .map_err(api_error)?;

            let reference = ResourceRef {
                kind: types.kind.clone(),
                name,
                namespace: target_namespace,
            };
            info!(resource = %reference, "applied");
            applied.push(reference);
        }

        Ok(applied)
    }

    async fn get(&self, resource: &ResourceRef) -> ApiResult<ResourceState> {
        let (api, ar) = self.api_for(resource).await?;
        let obj = api.get(&resource.name).await.map_err(api_error)?;
        to_state(obj, &ar)
    }

    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ApiResult<Vec<ResourceState>> {
        let (ar, caps) = self.resolve_kind(kind).await?;
        let api = self.api(&ar, &caps, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = api.list(&params).await.map_err(api_error)?;
        let mut items = list
            .items
            .into_iter()
            .map(|obj| to_state(obj, &ar))
            .collect::<ApiResult<Vec<_>>>()?;
        items.sort_by(|a, b| a.name().cmp(&b.name()));
        Ok(items)
    }

    async fn delete(&self, resource: &ResourceRef) -> ApiResult<()> {
        let (api, _) = match self.api_for(resource).await {
            Ok(found) => found,
            Err(ApiError::UnknownKind(kind)) => {
                debug!(resource = %resource, %kind, "kind no longer served, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(&resource.name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(api_error(e)),
        }
    }

    async fn patch(&self, resource: &ResourceRef, patch: &serde_json::Value) -> ApiResult<()> {
        let (api, _) = self.api_for(resource).await?;
        api.patch(&resource.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn exec(&self, pod: &ResourceRef, command: &[String]) -> ApiResult<ExecOutput> {
        let namespace = pod
            .namespace
            .as_deref()
            .ok_or_else(|| ApiError::Exec(format!("pod {} has no namespace", pod.name)))?;
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let params = AttachParams {
            container: None,
            tty: false,
            stdin: false,
            stdout: true,
            stderr: true,
            max_stdin_buf_size: Some(1024),
            max_stdout_buf_size: Some(1024 * 1024),
            max_stderr_buf_size: Some(1024 * 1024),
        };

        let mut attached = pods
            .exec(&pod.name, command.to_vec(), &params)
            .await
            .map_err(|e| ApiError::Exec(e.to_string()))?;

        let (stdout, stderr) =
            futures::future::join(read_all(attached.stdout()), read_all(attached.stderr())).await;

        let status = attached
            .take_status()
            .ok_or_else(|| ApiError::Exec("no status channel".to_string()))?
            .await
            .ok_or_else(|| ApiError::Exec("status channel closed".to_string()))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: exit_code_of(&status),
        })
    }

    async fn authorization_check(
        &self,
        subject: &str,
        verb: &str,
        kind: &str,
        namespace: &str,
    ) -> ApiResult<bool> {
        let (base, sub) = match kind.split_once('/') {
            Some((base, sub)) => (base, Some(sub)),
            None => (kind, None),
        };
        let (group, plural) = match self.resolve_kind(base).await {
            Ok((ar, _)) => (ar.group, ar.plural),
            Err(_) => (String::new(), base.to_ascii_lowercase()),
        };
        let resource = match sub {
            Some(sub) => format!("{}/{}", plural, sub),
            None => plural,
        };

        let reviews: Api<SubjectAccessReview> = Api::all(self.client.clone());
        let review = access_review(subject, verb, &group, &resource, namespace);
        let result = reviews
            .create(&PostParams::default(), &review)
            .await
            .map_err(api_error)?;

        let allowed = result.status.map(|s| s.allowed).unwrap_or(false);
        debug!(subject, verb, resource = %resource, allowed, "access review");
        Ok(allowed)
    }

    async fn ping(&self) -> ApiResult<String> {
        let info = self.client.apiserver_version().await.map_err(api_error)?;
        Ok(info.git_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    fn resource(group: &str, kind: &str, plural: &str) -> (ApiResource, ApiCapabilities) {
        let gvk = GroupVersionKind::gvk(group, "v1", kind);
        (
            ApiResource::from_gvk_with_plural(&gvk, plural),
            ApiCapabilities {
                scope: Scope::Namespaced,
                subresources: Vec::new(),
                operations: Vec::new(),
            },
        )
    }

    #[test]
    fn test_gvk_of() {
        let gvk = gvk_of(&TypeMeta {
            api_version: "networking.k8s.io/v1".to_string(),
            kind: "NetworkPolicy".to_string(),
        });
        assert_eq!(gvk.group, "networking.k8s.io");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "NetworkPolicy");

        let core = gvk_of(&TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        });
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");
    }

    #[test]
    fn test_find_kind_prefers_core_group() {
        let candidates = vec![
            resource("events.k8s.io", "Event", "events"),
            resource("", "Event", "events"),
            resource("apps", "Deployment", "deployments"),
        ];

        let (event, _) = find_kind(candidates.clone().into_iter(), "event").unwrap();
        assert_eq!(event.group, "");

        let (deploy, _) = find_kind(candidates.clone().into_iter(), "deployments").unwrap();
        assert_eq!(deploy.kind, "Deployment");

        assert!(find_kind(candidates.into_iter(), "Widget").is_none());
    }

    #[test]
    fn test_with_types_fills_missing_type_meta() {
        let (ar, _) = resource("apps", "Deployment", "deployments");
        let obj = DynamicObject::new("web", &ar);
        let mut bare = obj.clone();
        bare.types = None;

        let restored = with_types(bare, &ar);
        assert_eq!(restored.types, obj.types);
        let state = to_state(restored, &ar).unwrap();
        assert_eq!(state.kind(), Some("Deployment"));
        assert_eq!(state.name(), Some("web"));
    }

    #[test]
    fn test_exit_code_parsing() {
        let success = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        assert_eq!(exit_code_of(&success), 0);

        let non_zero = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("2".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(exit_code_of(&non_zero), 2);

        let legacy = Status {
            status: Some("Failure".to_string()),
            reason: Some("ExitCode: 7".to_string()),
            ..Default::default()
        };
        assert_eq!(exit_code_of(&legacy), 7);

        assert_eq!(exit_code_of(&Status::default()), 1);
    }

    #[test]
    fn test_access_review_for_service_account() {
        let review = access_review(
            "system:serviceaccount:demo:reader",
            "get",
            "",
            "pods/log",
            "demo",
        );
        let spec = review.spec;
        assert_eq!(spec.user.as_deref(), Some("system:serviceaccount:demo:reader"));
        let groups = spec.groups.unwrap();
        assert!(groups.contains(&"system:serviceaccounts:demo".to_string()));

        let attrs = spec.resource_attributes.unwrap();
        assert_eq!(attrs.resource.as_deref(), Some("pods"));
        assert_eq!(attrs.subresource.as_deref(), Some("log"));
        assert_eq!(attrs.namespace.as_deref(), Some("demo"));
        assert_eq!(attrs.verb.as_deref(), Some("get"));
    }

    #[test]
    fn test_access_review_for_user() {
        let review = access_review("jane", "delete", "apps", "deployments", "demo");
        assert!(review.spec.groups.is_none());
        let attrs = review.spec.resource_attributes.unwrap();
        assert_eq!(attrs.group.as_deref(), Some("apps"));
        assert_eq!(attrs.subresource, None);
    }

    #[test]
    fn test_field_manager_constant() {
        assert_eq!(FIELD_MANAGER, "kubedemo");
    }
}
