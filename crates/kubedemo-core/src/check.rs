//! Declarative checks, as written in workflow files
//!
//! A [`Check`] is turned into a [`Condition`] at the moment its phase runs,
//! so references to identifiers discovered earlier in the run (a pod name
//! picked by a `podReady` check) resolve against the live context.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SharedClient;
use crate::condition::{Condition, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
use crate::context::ExecutionContext;
use crate::error::{CoreError, Result};
use crate::probes::{
    AbsencePredicate, AuthorizationPredicate, ConnectivityMethod, ConnectivityPredicate,
    DiscoverySlot, ExistencePredicate, Expected, FieldMatchPredicate, HttpPredicate,
    PodReadyPredicate,
};
use crate::resource::{ResourceRef, expand_short_kind};

/// Optional per-check polling bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

impl Bounds {
    /// Bounds used when neither the check nor the workflow sets any
    pub fn standard() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            interval: Some(DEFAULT_INTERVAL),
        }
    }

    /// Fill unset values from `fallback`
    pub fn or(self, fallback: Bounds) -> Bounds {
        Bounds {
            timeout: self.timeout.or(fallback.timeout),
            interval: self.interval.or(fallback.interval),
        }
    }

    /// Reject bounds that could never produce a usable condition
    pub fn check(self) -> std::result::Result<(), String> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err("timeout must be greater than zero".to_string());
        }
        if self.interval.is_some_and(|i| i.is_zero()) {
            return Err("interval must be greater than zero".to_string());
        }
        if let (Some(timeout), Some(interval)) = (self.timeout, self.interval)
            && interval > timeout
        {
            return Err("interval must not exceed timeout".to_string());
        }
        Ok(())
    }

    fn resolve(self, defaults: Bounds) -> (Duration, Duration) {
        let merged = self.or(defaults);
        (
            merged.timeout.unwrap_or(DEFAULT_TIMEOUT),
            merged.interval.unwrap_or(DEFAULT_INTERVAL),
        )
    }
}

/// Positive or negative assertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    #[default]
    #[serde(alias = "granted", alias = "success")]
    Allow,
    #[serde(alias = "denied", alias = "blocked")]
    Deny,
}

impl Expectation {
    pub fn is_allow(self) -> bool {
        self == Expectation::Allow
    }
}

/// An object addressed by kind and name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCheck {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub bounds: Bounds,
}

/// A field of an object compared to a value or to another field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCheck {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals_field: Option<String>,
    #[serde(flatten)]
    pub bounds: Bounds,
}

/// A ready pod picked by label selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodReadyCheck {
    pub selector: String,
    /// Key under which the chosen pod name is remembered
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub bounds: Bounds,
}

/// Network reachability from a pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityCheck {
    /// Pod name, or a key remembered by a `podReady` check
    pub from: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub expect: Expectation,
    #[serde(default)]
    pub method: ConnectivityMethod,
    #[serde(flatten)]
    pub bounds: Bounds,
}

/// RBAC permission of a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCheck {
    pub subject: String,
    pub verb: String,
    /// Resource, e.g. "pods" or "secrets"
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub expect: Expectation,
    #[serde(flatten)]
    pub bounds: Bounds,
}

/// Local HTTP endpoint status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCheck {
    pub url: String,
    #[serde(default = "default_http_status")]
    pub expect_status: u16,
    #[serde(flatten)]
    pub bounds: Bounds,
}

fn default_http_status() -> u16 {
    200
}

/// One convergence or functional check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Check {
    Exists(TargetCheck),
    Absent(TargetCheck),
    Field(FieldCheck),
    PodReady(PodReadyCheck),
    Connectivity(ConnectivityCheck),
    Authorization(AuthorizationCheck),
    Http(HttpCheck),
}

/// A check resolved against the running context
pub struct BuiltCheck {
    pub condition: Condition,
    /// Context key and slot to copy into `ExecutionContext::discovered` once met
    pub discovery: Option<(String, DiscoverySlot)>,
}

impl Check {
    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            Check::Exists(t) => format!("{}/{} to exist", expand_short_kind(&t.kind), t.name),
            Check::Absent(t) => format!("{}/{} to be gone", expand_short_kind(&t.kind), t.name),
            Check::Field(f) => {
                let expected = match (&f.equals, &f.equals_field) {
                    (Some(v), _) => v.to_string(),
                    (None, Some(field)) => field.clone(),
                    (None, None) => "?".to_string(),
                };
                format!(
                    "{}/{} {} == {}",
                    expand_short_kind(&f.kind),
                    f.name,
                    f.path,
                    expected
                )
            }
            Check::PodReady(p) => format!("pod matching '{}' to be ready", p.selector),
            Check::Connectivity(c) => format!(
                "{} -> {}:{} to be {}",
                c.from,
                c.address,
                c.port,
                if c.expect.is_allow() { "reachable" } else { "blocked" }
            ),
            Check::Authorization(a) => format!(
                "{} {} {} {}",
                a.subject,
                if a.expect.is_allow() { "can" } else { "cannot" },
                a.verb,
                a.kind
            ),
            Check::Http(h) => format!("GET {} to return {}", h.url, h.expect_status),
        }
    }

    fn bounds(&self) -> Bounds {
        match self {
            Check::Exists(t) | Check::Absent(t) => t.bounds,
            Check::Field(f) => f.bounds,
            Check::PodReady(p) => p.bounds,
            Check::Connectivity(c) => c.bounds,
            Check::Authorization(a) => a.bounds,
            Check::Http(h) => h.bounds,
        }
    }

    /// Reject checks that can never be evaluated
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Check::Field(f) if f.equals.is_some() == f.equals_field.is_some() => Err(format!(
                "field check on {}/{} needs exactly one of 'equals' or 'equalsField'",
                f.kind, f.name
            )),
            Check::PodReady(p) if p.selector.trim().is_empty() => {
                Err("podReady check needs a non-empty selector".to_string())
            }
            Check::Connectivity(c) if c.port == 0 => Err(format!(
                "connectivity check from {} to {} needs a non-zero port",
                c.from, c.address
            )),
            _ => Ok(()),
        }
    }

    /// Reject bounds that stay unusable once the workflow defaults fill the gaps
    pub fn validate_bounds(&self, defaults: Bounds) -> std::result::Result<(), String> {
        self.bounds()
            .or(defaults.or(Bounds::standard()))
            .check()
            .map_err(|reason| format!("check '{}': {}", self.describe(), reason))
    }

    /// Resolve this check into a condition for the current run
    pub fn build(
        &self,
        client: &SharedClient,
        ctx: &ExecutionContext,
        defaults: Bounds,
    ) -> Result<BuiltCheck> {
        self.validate().map_err(|reason| CoreError::InvalidCondition {
            description: self.describe(),
            reason,
        })?;

        let (timeout, interval) = self.bounds().resolve(defaults);
        let description = self.describe();
        let target = |kind: &str, name: &str, namespace: &Option<String>| {
            ResourceRef {
                kind: expand_short_kind(kind),
                name: name.to_string(),
                namespace: namespace.clone(),
            }
            .or_namespace(&ctx.namespace)
        };
        let client = client.clone();
        let mut discovery = None;

        let condition = match self {
            Check::Exists(t) => Condition::new(
                description,
                ExistencePredicate::new(client, target(&t.kind, &t.name, &t.namespace)),
                timeout,
                interval,
            )?,
            Check::Absent(t) => Condition::new(
                description,
                AbsencePredicate::new(client, target(&t.kind, &t.name, &t.namespace)),
                timeout,
                interval,
            )?,
            Check::Field(f) => {
                let expected = match (&f.equals, &f.equals_field) {
                    (Some(value), _) => Expected::Value(value.clone()),
                    (None, Some(field)) => Expected::Field(field.clone()),
                    (None, None) => unreachable!("rejected by validate"),
                };
                Condition::new(
                    description,
                    FieldMatchPredicate::new(
                        client,
                        target(&f.kind, &f.name, &f.namespace),
                        f.path.clone(),
                        expected,
                    ),
                    timeout,
                    interval,
                )?
            }
            Check::PodReady(p) => {
                let slot = DiscoverySlot::new();
                if let Some(key) = &p.save_as {
                    discovery = Some((key.clone(), slot.clone()));
                }
                let namespace = p.namespace.clone().unwrap_or_else(|| ctx.namespace.clone());
                Condition::new(
                    description,
                    PodReadyPredicate::new(client, namespace, p.selector.clone(), slot),
                    timeout,
                    interval,
                )?
            }
            Check::Connectivity(c) => {
                let pod_name = ctx.recall(&c.from).unwrap_or(&c.from);
                let source = ResourceRef::namespaced("Pod", pod_name, ctx.namespace.clone());
                Condition::new(
                    description,
                    ConnectivityPredicate::new(
                        client,
                        source,
                        c.address.clone(),
                        c.port,
                        c.expect.is_allow(),
                    )
                    .method(c.method),
                    timeout,
                    interval,
                )?
            }
            Check::Authorization(a) => Condition::new(
                description,
                AuthorizationPredicate::new(
                    client,
                    a.subject.clone(),
                    a.verb.clone(),
                    a.kind.clone(),
                    a.namespace.clone().unwrap_or_else(|| ctx.namespace.clone()),
                    a.expect.is_allow(),
                ),
                timeout,
                interval,
            )?,
            Check::Http(h) => Condition::new(
                description,
                HttpPredicate::new(
                    h.url.clone(),
                    h.expect_status,
                    interval.min(Duration::from_secs(10)),
                ),
                timeout,
                interval,
            )?,
        };

        Ok(BuiltCheck {
            condition,
            discovery,
        })
    }
}
