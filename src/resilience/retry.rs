//! Retry-with-backoff policy.
//!
//! The policy only decides; the governor's execution loop owns the sleeping
//! and the re-invocation of the unit of work.

use crate::Error;
use rand::Rng;
use std::time::Duration;

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 means exactly one attempt.
    pub retry_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Add up to 10% random delay on top of the computed backoff.
    pub jitter: bool,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

impl RetryPolicy {
    pub fn new(retry_attempts: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            retry_attempts,
            backoff_min,
            backoff_max,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// `min(backoff_max, backoff_min * 2^attempt)`, `attempt` is 0-based.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_min.as_millis() as u64;
        let cap = self.backoff_max.as_millis() as u64;

        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor).min(cap);
        Duration::from_millis(delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay.as_millis() as u64) / 10;
        if spread == 0 {
            return delay;
        }
        let extra = rand::rng().random_range(0..=spread);
        delay + Duration::from_millis(extra)
    }

    /// Decide what to do next after an attempt failed.
    ///
    /// - `attempt` is 0-based (first failure => attempt=0).
    /// - Only transient errors are retried; cancellation never is.
    pub fn decide(&self, err: &Error, attempt: u32) -> Decision {
        if !err.is_retryable() || attempt >= self.retry_attempts {
            return Decision::Fail;
        }

        let mut delay = self.backoff(attempt);
        if let Some(hint) = err.retry_after() {
            delay = delay.max(hint.min(self.backoff_max));
        }
        Decision::Retry {
            delay: self.jittered(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::StandardErrorCode;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40))
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let p = policy();
        assert_eq!(p.backoff(0), Duration::from_millis(10));
        assert_eq!(p.backoff(1), Duration::from_millis(20));
        assert_eq!(p.backoff(2), Duration::from_millis(40));
        assert_eq!(p.backoff(3), Duration::from_millis(40));
        assert_eq!(p.backoff(80), Duration::from_millis(40));
    }

    #[test]
    fn test_transient_retried_until_exhausted() {
        let p = policy();
        let err = Error::transient(StandardErrorCode::ServerError, "500");
        assert_eq!(
            p.decide(&err, 0),
            Decision::Retry {
                delay: Duration::from_millis(10)
            }
        );
        assert!(matches!(p.decide(&err, 2), Decision::Retry { .. }));
        assert_eq!(p.decide(&err, 3), Decision::Fail);
    }

    #[test]
    fn test_permanent_and_cancelled_fail_fast() {
        let p = policy();
        let err = Error::permanent(StandardErrorCode::InvalidRequest, "400");
        assert_eq!(p.decide(&err, 0), Decision::Fail);
        assert_eq!(p.decide(&Error::cancelled("test"), 0), Decision::Fail);
    }

    #[test]
    fn test_zero_retry_attempts_never_retries() {
        let p = RetryPolicy::new(0, Duration::from_millis(10), Duration::from_millis(40));
        let err = Error::transient(StandardErrorCode::Timeout, "timeout");
        assert_eq!(p.decide(&err, 0), Decision::Fail);
    }

    #[test]
    fn test_retry_after_hint_raises_delay_within_cap() {
        let p = policy();
        let err = Error::transient(StandardErrorCode::RateLimited, "429")
            .with_retry_after(Duration::from_secs(5));
        assert_eq!(
            p.decide(&err, 0),
            Decision::Retry {
                delay: Duration::from_millis(40)
            }
        );
    }

    #[test]
    fn test_jitter_never_shortens_delay() {
        let p = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10)).with_jitter(true);
        let err = Error::transient(StandardErrorCode::Network, "reset");
        for attempt in 0..5 {
            match p.decide(&err, attempt) {
                Decision::Retry { delay } => {
                    let base = p.backoff(attempt);
                    assert!(delay >= base);
                    assert!(delay <= base + base / 10);
                }
                Decision::Fail => panic!("expected retry"),
            }
        }
    }
}
