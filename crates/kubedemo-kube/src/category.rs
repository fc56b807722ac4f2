//! Apply ordering
//!
//! Objects of one manifest are submitted dependencies-first so that a
//! namespace, service account or CRD exists before anything referring to it.

/// Apply order bucket, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApplyOrder {
    /// CustomResourceDefinition
    Definition = 0,
    /// Namespace
    Namespace = 1,
    /// ResourceQuota, LimitRange
    Quota = 2,
    /// ServiceAccount, Role, RoleBinding and their cluster-wide forms
    Rbac = 10,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolume, PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// Service, NetworkPolicy, Ingress
    Network = 30,
    /// Deployment, StatefulSet, DaemonSet, ReplicaSet, Pod
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    /// HorizontalPodAutoscaler, PodDisruptionBudget
    Scaling = 60,
    /// Objects of a custom API group
    Custom = 70,
    /// Everything else
    Other = 100,
}

const BUILTIN_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "node.k8s.io",
    "scheduling.k8s.io",
];

/// API group of an apiVersion ("" for the core group)
pub fn api_group(api_version: &str) -> &str {
    api_version
        .rsplit_once('/')
        .map(|(group, _)| group)
        .unwrap_or("")
}

impl ApplyOrder {
    pub fn of(kind: &str, api_version: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Definition,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::Quota,
            "ServiceAccount" | "Role" | "RoleBinding" | "ClusterRole" | "ClusterRoleBinding" => {
                Self::Rbac
            }
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "Service" | "Endpoints" | "NetworkPolicy" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Scaling,
            _ if !BUILTIN_GROUPS.contains(&api_group(api_version)) => Self::Custom,
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_order() {
        assert!(ApplyOrder::Definition < ApplyOrder::Namespace);
        assert!(ApplyOrder::Namespace < ApplyOrder::Rbac);
        assert!(ApplyOrder::Rbac < ApplyOrder::Network);
        assert!(ApplyOrder::Network < ApplyOrder::Workload);
        assert!(ApplyOrder::Workload < ApplyOrder::Custom);
    }

    #[test]
    fn test_categorize() {
        assert_eq!(ApplyOrder::of("ServiceAccount", "v1"), ApplyOrder::Rbac);
        assert_eq!(
            ApplyOrder::of("NetworkPolicy", "networking.k8s.io/v1"),
            ApplyOrder::Network
        );
        assert_eq!(ApplyOrder::of("Deployment", "apps/v1"), ApplyOrder::Workload);
        assert_eq!(
            ApplyOrder::of("Certificate", "cert-manager.io/v1"),
            ApplyOrder::Custom
        );
        assert_eq!(ApplyOrder::of("Event", "v1"), ApplyOrder::Other);
    }

    #[test]
    fn test_api_group() {
        assert_eq!(api_group("v1"), "");
        assert_eq!(api_group("apps/v1"), "apps");
        assert_eq!(api_group("networking.k8s.io/v1"), "networking.k8s.io");
    }
}
