//! Kubedemo Kube - Kubernetes integration for kubedemo
//!
//! This crate provides:
//! - **KubeClient**: The declarative client backed by kube-rs (server-side apply,
//!   discovery-based kind resolution, exec, SubjectAccessReview)
//! - **Apply ordering**: Dependencies-first submission of multi-document manifests
//! - **Port forwarding**: `kubectl port-forward` helpers tracked for termination

pub mod category;
pub mod client;
pub mod error;
pub mod portforward;

pub use category::ApplyOrder;
pub use client::{FIELD_MANAGER, KubeClient};
pub use error::{KubeError, Result, api_error};
pub use portforward::PortForwardAction;
