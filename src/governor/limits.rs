use crate::config::serde_millis;
use crate::resilience::retry::RetryPolicy;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-service ceilings, immutable once a service is first used.
///
/// A cap of 0 means the corresponding window is unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLimits {
    pub max_concurrent: usize,
    pub per_minute_cap: u32,
    pub per_hour_cap: u32,
    pub retry_attempts: u32,
    #[serde(rename = "backoff_min_ms", with = "serde_millis")]
    pub backoff_min: Duration,
    #[serde(rename = "backoff_max_ms", with = "serde_millis")]
    pub backoff_max: Duration,
    pub jitter: bool,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            per_minute_cap: 60,
            per_hour_cap: 3600,
            retry_attempts: 5,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl ServiceLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits for the LLM API.
    pub fn openai() -> Self {
        Self {
            max_concurrent: 8,
            per_minute_cap: 500,
            per_hour_cap: 10_000,
            retry_attempts: 5,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            jitter: false,
        }
    }

    /// Limits for the remote automation endpoints, which allow roughly
    /// 80 calls per hour.
    pub fn zapier() -> Self {
        Self {
            max_concurrent: 3,
            per_minute_cap: 60,
            per_hour_cap: 75,
            retry_attempts: 3,
            backoff_min: Duration::from_secs(2),
            backoff_max: Duration::from_secs(30),
            jitter: false,
        }
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_per_minute_cap(mut self, cap: u32) -> Self {
        self.per_minute_cap = cap;
        self
    }

    pub fn with_per_hour_cap(mut self, cap: u32) -> Self {
        self.per_hour_cap = cap;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::configuration_with_context(
                "max_concurrent must be greater than zero",
                ErrorContext::new()
                    .with_field_path("max_concurrent")
                    .with_source("service_limits"),
            ));
        }
        if self.backoff_min > self.backoff_max {
            return Err(Error::configuration_with_context(
                "backoff_min must not exceed backoff_max",
                ErrorContext::new()
                    .with_field_path("backoff_min_ms")
                    .with_details(format!(
                        "{}ms > {}ms",
                        self.backoff_min.as_millis(),
                        self.backoff_max.as_millis()
                    ))
                    .with_source("service_limits"),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.backoff_min, self.backoff_max)
            .with_jitter(self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(ServiceLimits::default().validate().is_ok());
        assert!(ServiceLimits::openai().validate().is_ok());
        assert!(ServiceLimits::zapier().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let limits = ServiceLimits::new()
            .with_backoff(Duration::from_millis(50), Duration::from_millis(10));
        let err = limits.validate().unwrap_err();
        assert!(err.to_string().contains("backoff_min"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        assert!(ServiceLimits::new().with_max_concurrent(0).validate().is_err());
    }

    #[test]
    fn test_yaml_uses_millisecond_keys() {
        let limits: ServiceLimits = serde_yaml::from_str(
            "max_concurrent: 2\nretry_attempts: 2\nbackoff_min_ms: 10\nbackoff_max_ms: 40\n",
        )
        .unwrap();
        assert_eq!(limits.max_concurrent, 2);
        assert_eq!(limits.backoff_min, Duration::from_millis(10));
        assert_eq!(limits.backoff_max, Duration::from_millis(40));
        // unspecified fields fall back to defaults
        assert_eq!(limits.per_minute_cap, 60);
    }
}
