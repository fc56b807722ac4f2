//! Probe library: predicates over the declarative client
//!
//! Probes swallow every client error and answer `false` for that tick;
//! only the poller's timeout turns a probe into a failure.
//!
//! Connectivity and authorization probes take an `expect` flag so that a
//! deny assertion ("this connection must be blocked") is the same shape as
//! an allow assertion.

use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::SharedClient;
use crate::condition::Predicate;
use crate::error::ApiError;
use crate::resource::{ResourceRef, values_match};

/// True once the object can be fetched
pub struct ExistencePredicate {
    client: SharedClient,
    resource: ResourceRef,
}

impl ExistencePredicate {
    pub fn new(client: SharedClient, resource: ResourceRef) -> Self {
        Self { client, resource }
    }
}

/// Log an API error a probe turned into `false`
///
/// Transient failures (unreachable API server, throttling, 5xx) go out as
/// warnings, everything else at debug level.
fn log_swallowed(subject: &dyn Display, error: &ApiError, message: &str) {
    if error.is_transient() {
        warn!(subject = %subject, error = %error, "{}", message);
    } else {
        debug!(subject = %subject, error = %error, "{}", message);
    }
}

#[async_trait]
impl Predicate for ExistencePredicate {
    async fn evaluate(&self) -> bool {
        match self.client.get(&self.resource).await {
            Ok(_) => true,
            Err(e) => {
                log_swallowed(&self.resource, &e, "not present yet");
                false
            }
        }
    }
}

/// True once the API reports the object as not found
pub struct AbsencePredicate {
    client: SharedClient,
    resource: ResourceRef,
}

impl AbsencePredicate {
    pub fn new(client: SharedClient, resource: ResourceRef) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl Predicate for AbsencePredicate {
    async fn evaluate(&self) -> bool {
        match self.client.get(&self.resource).await {
            Ok(_) => false,
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                log_swallowed(&self.resource, &e, "cannot confirm absence");
                false
            }
        }
    }
}

/// Value a field is compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expected {
    /// A literal value
    Value(Value),
    /// Another field path of the same object
    Field(String),
}

/// True once a field of the object equals the expected value
pub struct FieldMatchPredicate {
    client: SharedClient,
    resource: ResourceRef,
    path: String,
    expected: Expected,
}

impl FieldMatchPredicate {
    pub fn new(
        client: SharedClient,
        resource: ResourceRef,
        path: impl Into<String>,
        expected: Expected,
    ) -> Self {
        Self {
            client,
            resource,
            path: path.into(),
            expected,
        }
    }

    /// Compare against a literal value
    pub fn equals(
        client: SharedClient,
        resource: ResourceRef,
        path: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::new(client, resource, path, Expected::Value(value.into()))
    }
}

#[async_trait]
impl Predicate for FieldMatchPredicate {
    async fn evaluate(&self) -> bool {
        let state = match self.client.get(&self.resource).await {
            Ok(state) => state,
            Err(e) => {
                log_swallowed(&self.resource, &e, "field probe could not read object");
                return false;
            }
        };

        let Some(actual) = state.field(&self.path) else {
            return false;
        };
        match &self.expected {
            Expected::Value(expected) => values_match(actual, expected),
            Expected::Field(other) => state
                .field(other)
                .is_some_and(|expected| values_match(actual, expected)),
        }
    }
}

/// How a connectivity probe reaches its target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityMethod {
    /// TCP connect with `nc -z`
    #[default]
    Tcp,
    /// HTTP GET with `wget`
    Http,
}

/// Network reachability from inside a pod, with expectation inversion
pub struct ConnectivityPredicate {
    client: SharedClient,
    source: ResourceRef,
    address: String,
    port: u16,
    expect_success: bool,
    method: ConnectivityMethod,
    connect_timeout: Duration,
}

impl ConnectivityPredicate {
    pub fn new(
        client: SharedClient,
        source: ResourceRef,
        address: impl Into<String>,
        port: u16,
        expect_success: bool,
    ) -> Self {
        Self {
            client,
            source,
            address: address.into(),
            port,
            expect_success,
            method: ConnectivityMethod::Tcp,
            connect_timeout: Duration::from_secs(2),
        }
    }

    pub fn method(mut self, method: ConnectivityMethod) -> Self {
        self.method = method;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Command executed inside the source pod
    pub fn command(&self) -> Vec<String> {
        let secs = self.connect_timeout.as_secs().max(1).to_string();
        match self.method {
            ConnectivityMethod::Tcp => vec![
                "nc".to_string(),
                "-z".to_string(),
                "-w".to_string(),
                secs,
                self.address.clone(),
                self.port.to_string(),
            ],
            ConnectivityMethod::Http => vec![
                "wget".to_string(),
                "-q".to_string(),
                "-O".to_string(),
                "/dev/null".to_string(),
                "-T".to_string(),
                secs,
                format!("http://{}:{}/", self.address, self.port),
            ],
        }
    }
}

#[async_trait]
impl Predicate for ConnectivityPredicate {
    async fn evaluate(&self) -> bool {
        match self.client.exec(&self.source, &self.command()).await {
            Ok(output) => output.success() == self.expect_success,
            Err(e) => {
                // The probe itself never ran, so neither outcome can be asserted
                log_swallowed(&self.source, &e, "connectivity probe could not exec");
                false
            }
        }
    }
}

/// RBAC permission check, with expectation inversion
pub struct AuthorizationPredicate {
    client: SharedClient,
    subject: String,
    verb: String,
    kind: String,
    namespace: String,
    expect_granted: bool,
}

impl AuthorizationPredicate {
    pub fn new(
        client: SharedClient,
        subject: impl Into<String>,
        verb: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        expect_granted: bool,
    ) -> Self {
        Self {
            client,
            subject: subject.into(),
            verb: verb.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            expect_granted,
        }
    }
}

#[async_trait]
impl Predicate for AuthorizationPredicate {
    async fn evaluate(&self) -> bool {
        match self
            .client
            .authorization_check(&self.subject, &self.verb, &self.kind, &self.namespace)
            .await
        {
            Ok(granted) => granted == self.expect_granted,
            Err(e) => {
                log_swallowed(&self.subject, &e, "authorization check failed");
                false
            }
        }
    }
}

/// Shared cell a probe writes a discovered identifier into
#[derive(Debug, Clone, Default)]
pub struct DiscoverySlot(Arc<Mutex<Option<String>>>);

impl DiscoverySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().ok().and_then(|v| v.clone())
    }

    fn set(&self, value: &str) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(value.to_string());
        }
    }
}

/// True once a pod matching the selector is Running and ready;
/// the pod's name is written to the slot
pub struct PodReadyPredicate {
    client: SharedClient,
    namespace: String,
    selector: String,
    slot: DiscoverySlot,
}

impl PodReadyPredicate {
    pub fn new(
        client: SharedClient,
        namespace: impl Into<String>,
        selector: impl Into<String>,
        slot: DiscoverySlot,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            selector: selector.into(),
            slot,
        }
    }
}

#[async_trait]
impl Predicate for PodReadyPredicate {
    async fn evaluate(&self) -> bool {
        let pods = match self
            .client
            .list("Pod", Some(&self.namespace), Some(&self.selector))
            .await
        {
            Ok(pods) => pods,
            Err(e) => {
                log_swallowed(&self.selector, &e, "pod listing failed");
                return false;
            }
        };

        match pods
            .iter()
            .filter(|p| p.is_pod_ready())
            .find_map(|p| p.name())
        {
            Some(name) => {
                self.slot.set(name);
                true
            }
            None => false,
        }
    }
}

/// Local HTTP check, typically against a port-forwarded endpoint
pub struct HttpPredicate {
    http: reqwest::Client,
    url: String,
    expected_status: u16,
}

impl HttpPredicate {
    pub fn new(url: impl Into<String>, expected_status: u16, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: url.into(),
            expected_status,
        }
    }
}

#[async_trait]
impl Predicate for HttpPredicate {
    async fn evaluate(&self) -> bool {
        match self.http.get(&self.url).send().await {
            Ok(response) => response.status().as_u16() == self.expected_status,
            Err(e) => {
                debug!(url = %self.url, error = %e, "HTTP probe failed");
                false
            }
        }
    }
}
