//! Fixed-interval condition polling
//!
//! Time is counted in whole intervals: a condition with a 2s interval that
//! holds on the fourth evaluation reports 6s elapsed. Each evaluation runs
//! inside its interval: one still pending when the interval ends counts as
//! false, and the next tick starts one interval after the previous one, so
//! a slow predicate cannot stretch a wait past `timeout + interval`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span};

use crate::condition::{Condition, PollOutcome};
use crate::reporter::SharedReporter;

/// Evaluates conditions until they hold or time out
#[derive(Clone)]
pub struct ConditionPoller {
    reporter: SharedReporter,
}

impl ConditionPoller {
    pub fn new(reporter: SharedReporter) -> Self {
        Self { reporter }
    }

    /// Poll `condition` until its predicate holds or its timeout is used up.
    ///
    /// A timeout is a normal outcome (`met == false`), not an error.
    pub async fn wait(&self, condition: &Condition) -> PollOutcome {
        let span = debug_span!("wait", condition = condition.description());
        self.poll(condition).instrument(span).await
    }

    async fn poll(&self, condition: &Condition) -> PollOutcome {
        let timeout = condition.timeout();
        let interval = condition.interval();
        let mut elapsed = Duration::ZERO;

        while elapsed < timeout {
            let tick = Instant::now();
            match tokio::time::timeout(interval, condition.check()).await {
                Ok(true) => {
                    debug!(elapsed_secs = elapsed.as_secs(), "condition met");
                    return PollOutcome { met: true, elapsed };
                }
                Ok(false) => {}
                Err(_) => debug!(interval_secs = interval.as_secs(), "evaluation timed out"),
            }

            self.reporter.progress(condition.description(), elapsed, timeout);
            tokio::time::sleep_until(tick + interval).await;
            elapsed += interval;
        }

        debug!(timeout_secs = timeout.as_secs(), "condition timed out");
        PollOutcome {
            met: false,
            elapsed: timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::condition::from_fn;
    use crate::reporter::RecordingReporter;

    fn poller() -> (ConditionPoller, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        (ConditionPoller::new(reporter.clone()), reporter)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let (poller, reporter) = poller();
        let condition = Condition::new("ready", from_fn(|| true), secs(30), secs(2)).unwrap();

        let start = tokio::time::Instant::now();
        let outcome = poller.wait(&condition).await;

        assert!(outcome.met);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(reporter.progress_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_false_times_out() {
        let (poller, reporter) = poller();
        let condition = Condition::new("never", from_fn(|| false), secs(30), secs(2)).unwrap();

        let start = tokio::time::Instant::now();
        let outcome = poller.wait(&condition).await;

        assert!(!outcome.met);
        assert_eq!(outcome.elapsed, secs(30));
        assert!(start.elapsed() <= secs(32));
        assert_eq!(reporter.progress_count(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uneven_interval_stays_within_bound() {
        let (poller, _) = poller();
        let condition = Condition::new("never", from_fn(|| false), secs(10), secs(4)).unwrap();

        let start = tokio::time::Instant::now();
        let outcome = poller.wait(&condition).await;

        assert!(!outcome.met);
        assert_eq!(outcome.elapsed, secs(10));
        assert!(start.elapsed() <= secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_after_some_intervals() {
        let (poller, reporter) = poller();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let condition = Condition::new(
            "replicas",
            from_fn(move || counter.fetch_add(1, Ordering::SeqCst) >= 3),
            secs(30),
            secs(2),
        )
        .unwrap();

        let outcome = poller.wait(&condition).await;

        assert!(outcome.met);
        assert_eq!(outcome.elapsed, secs(6));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(reporter.progress_count(), 3);
    }

    struct SlowPredicate {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl crate::condition::Predicate for SlowPredicate {
        async fn evaluate(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_predicate_cannot_stretch_the_wait() {
        let (poller, reporter) = poller();
        let calls = Arc::new(AtomicUsize::new(0));
        let predicate = SlowPredicate {
            delay: secs(5),
            calls: calls.clone(),
        };
        let condition = Condition::new("hung API call", predicate, secs(10), secs(2)).unwrap();

        let start = tokio::time::Instant::now();
        let outcome = poller.wait(&condition).await;

        assert!(!outcome.met);
        assert_eq!(outcome.elapsed, secs(10));
        assert!(start.elapsed() <= secs(12), "waited {:?}", start.elapsed());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(reporter.progress_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluation_time_counts_toward_the_interval() {
        let (poller, _) = poller();
        let calls = Arc::new(AtomicUsize::new(0));
        let predicate = SlowPredicate {
            delay: Duration::from_millis(1500),
            calls: calls.clone(),
        };
        let condition = Condition::new("slow but fine", predicate, secs(10), secs(2)).unwrap();

        let start = tokio::time::Instant::now();
        let outcome = poller.wait(&condition).await;

        assert!(outcome.met);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_equal_to_timeout_evaluates_once() {
        let (poller, _) = poller();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let condition = Condition::new(
            "single",
            from_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }),
            secs(5),
            secs(5),
        )
        .unwrap();

        let outcome = poller.wait(&condition).await;
        assert!(!outcome.met);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
