//! Linear backoff policy for retried fetches.

use rand::RngExt;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Attempt budget per fetch, including the first try.
pub const MAX_ATTEMPTS: u32 = 4;

/// Base backoff step. The observed scrapers use 2-3s per attempt; the delay
/// before attempt n is `n * base`, so 4s, 6s, 8s with the default base.
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Retry budget and backoff shape for one fetch operation.
///
/// The backoff is deliberately linear, not exponential: total wall time and
/// load on the target stay proportional to the attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Extra random delay added before each retry, to keep concurrent
    /// crawlers from retrying in lockstep.
    pub jitter: Option<RangeInclusive<Duration>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_base: BACKOFF_BASE,
            jitter: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
            jitter: None,
        }
    }

    /// Bounds given in either order are normalized; sampling from an
    /// inverted range would panic.
    pub fn with_jitter(mut self, low: Duration, high: Duration) -> Self {
        self.jitter = Some(low.min(high)..=low.max(high));
        self
    }

    /// Delay to observe before the given 1-based attempt. Zero before the
    /// first attempt; `attempt * base` (plus jitter, when configured) after.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let mut delay = self.backoff_base * attempt;
        if let Some(jitter) = &self.jitter {
            let low = jitter.start().as_millis() as u64;
            let high = jitter.end().as_millis() as u64;
            if high > 0 {
                delay += Duration::from_millis(rand::rng().random_range(low..=high));
            }
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay_before_first_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn test_backoff_is_linear_in_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2));
        assert_eq!(policy.delay_before(2), Duration::from_secs(4));
        assert_eq!(policy.delay_before(3), Duration::from_secs(6));
        assert_eq!(policy.delay_before(4), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_monotone() {
        let policy = RetryPolicy::new(10, Duration::from_millis(250));
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.delay_before(attempt);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(4, Duration::from_millis(10))
            .with_jitter(Duration::from_millis(5), Duration::from_millis(15));
        for _ in 0..50 {
            let delay = policy.delay_before(2);
            assert!(delay >= Duration::from_millis(25));
            assert!(delay <= Duration::from_millis(35));
        }
    }

    #[test]
    fn test_jitter_bounds_accepted_in_either_order() {
        let policy = RetryPolicy::new(4, Duration::from_millis(10))
            .with_jitter(Duration::from_millis(15), Duration::from_millis(5));
        for _ in 0..50 {
            let delay = policy.delay_before(2);
            assert!(delay >= Duration::from_millis(25));
            assert!(delay <= Duration::from_millis(35));
        }
    }

    #[test]
    fn test_default_policy_matches_observed_modules() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff_base, Duration::from_secs(2));
        assert!(policy.jitter.is_none());
    }
}
