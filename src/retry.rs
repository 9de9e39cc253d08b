//! Adaptive, randomized retry backoff and the delayed-retry scheduler (C6).

use crate::types::{BackoffPolicy, Event};
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Compute the next retry delay given the current delay `d`.
///
/// ```text
/// next = max( minBackoff + uniform_random_int[0, maxBackoff - minBackoff],
///             (d / 3) * 2 )
/// ```
///
/// The floor is a uniform sample in `[min_backoff, max_backoff]`; the
/// second term keeps the series close to the previous delay once it is
/// already near `max_backoff`, giving smooth decay rather than a reset to
/// the floor on every attempt.
pub fn next_backoff(policy: &BackoffPolicy, current_delay: Duration) -> Duration {
    let min_ms = policy.min_backoff.as_millis() as u64;
    let max_ms = policy.max_backoff.as_millis() as u64;

    let floor_ms = if max_ms > min_ms {
        min_ms + rand::thread_rng().gen_range(0..=(max_ms - min_ms))
    } else {
        min_ms
    };

    let decay_ms = (current_delay.as_millis() as u64 / 3) * 2;
    Duration::from_millis(floor_ms.max(decay_ms))
}

/// A pending retry: the destination to retry against, the records to
/// resubmit, and how many attempts remain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDestination {
    Primary,
    Secondary,
}

/// Remaining retry budget for one chain of retries. `Unbounded` models the
/// oversized-record path (§4.5), which must never be abandoned while
/// primary is unavailable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetriesLeft {
    Bounded(u32),
    Unbounded,
}

impl RetriesLeft {
    pub fn decrement(self) -> Option<RetriesLeft> {
        match self {
            RetriesLeft::Unbounded => Some(RetriesLeft::Unbounded),
            RetriesLeft::Bounded(0) => None,
            RetriesLeft::Bounded(n) => Some(RetriesLeft::Bounded(n - 1)),
        }
    }

    pub fn has_budget(self) -> bool {
        !matches!(self, RetriesLeft::Bounded(0))
    }
}

pub struct RetryAttempt {
    pub destination: RetryDestination,
    pub events: Vec<Event>,
    pub retries_left: RetriesLeft,
    pub delay: Duration,
}

/// Schedules delayed retry attempts on the shared Tokio runtime.
///
/// Every attempt runs as its own `tokio::spawn`'d task, the same discipline
/// the teacher crate uses for its batch-send and linger tasks: no shared
/// executor object to manage, just spawned futures that outlive the call
/// that created them.
#[derive(Clone, Default)]
pub struct RetryScheduler;

impl RetryScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Schedule `f` to run after `attempt.delay`, logging at debug level.
    pub fn schedule<F, Fut>(&self, attempt: RetryAttempt, f: F)
    where
        F: FnOnce(RetryAttempt) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(
            destination = ?attempt.destination,
            delay_ms = attempt.delay.as_millis() as u64,
            count = attempt.events.len(),
            "scheduling retry"
        );
        let delay = attempt.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f(attempt).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(min_ms),
            Duration::from_millis(max_ms),
            5,
        )
    }

    #[test]
    fn floor_is_within_bounds() {
        let p = policy(100, 1000);
        for _ in 0..200 {
            let d = next_backoff(&p, Duration::ZERO);
            assert!(d >= p.min_backoff, "{:?} >= {:?}", d, p.min_backoff);
            assert!(d <= p.max_backoff, "{:?} <= {:?}", d, p.max_backoff);
        }
    }

    #[test]
    fn decay_keeps_delay_near_previous_when_close_to_max() {
        let p = policy(10, 1000);
        let current = Duration::from_millis(990);
        let next = next_backoff(&p, current);
        // Invariant from §8: minBackoff <= next <= max(maxBackoff, 2d/3)
        assert!(next >= p.min_backoff);
        let upper = p.max_backoff.max((current / 3) * 2);
        assert!(next <= upper);
    }

    #[test]
    fn retries_left_decrements_and_stops_at_zero() {
        let r = RetriesLeft::Bounded(1);
        let r = r.decrement().unwrap();
        assert_eq!(r, RetriesLeft::Bounded(0));
        assert!(!r.has_budget());
        assert!(r.decrement().is_none());
    }

    #[test]
    fn unbounded_never_decrements_to_none() {
        let r = RetriesLeft::Unbounded;
        assert_eq!(r.decrement(), Some(RetriesLeft::Unbounded));
        assert!(r.has_budget());
    }
}
