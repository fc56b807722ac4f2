//! Conditions: named, timeout-bounded predicates

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A boolean check against remote state
///
/// Predicates never fail: anything that goes wrong while evaluating one
/// counts as "not yet".
#[async_trait]
pub trait Predicate: Send + Sync {
    /// Evaluate the predicate once
    async fn evaluate(&self) -> bool;
}

/// Predicate backed by a plain closure
pub struct FnPredicate<F>(F);

#[async_trait]
impl<F> Predicate for FnPredicate<F>
where
    F: Fn() -> bool + Send + Sync,
{
    async fn evaluate(&self) -> bool {
        (self.0)()
    }
}

/// Wrap a synchronous closure as a predicate
pub fn from_fn<F>(f: F) -> FnPredicate<F>
where
    F: Fn() -> bool + Send + Sync,
{
    FnPredicate(f)
}

/// Default time a condition may take to converge
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default spacing between evaluations
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// A named predicate with its polling bounds
pub struct Condition {
    description: String,
    predicate: Box<dyn Predicate>,
    timeout: Duration,
    interval: Duration,
}

impl Condition {
    /// Build a condition, rejecting zero durations and an interval longer than the timeout
    pub fn new(
        description: impl Into<String>,
        predicate: impl Predicate + 'static,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self> {
        let description = description.into();
        let invalid = |reason: &str| CoreError::InvalidCondition {
            description: description.clone(),
            reason: reason.to_string(),
        };

        if timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if interval.is_zero() {
            return Err(invalid("interval must be greater than zero"));
        }
        if interval > timeout {
            return Err(invalid("interval must not exceed timeout"));
        }

        Ok(Self {
            description,
            predicate: Box::new(predicate),
            timeout,
            interval,
        })
    }

    /// Human-readable description ("resource creation", ...)
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Upper bound on polling time
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spacing between evaluations
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evaluate the wrapped predicate once
    pub async fn check(&self) -> bool {
        self.predicate.evaluate().await
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Result of waiting on one condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Whether the predicate became true before the timeout
    pub met: bool,
    /// Time spent, counted in whole intervals
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}
