//! # Resilience Primitives Module
//!
//! Building blocks the governor composes around every upstream call.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Minute/hour sliding-window limiter ([`RateWindow`], [`RateLimiter`]) |
//! | [`retry`] | Exponential backoff and the retry/fail decision |
//!
//! ## Rate Limiter
//!
//! Calls over the cap are delayed until the oldest admission leaves its
//! window; nothing is ever rejected for being over the limit.
//!
//! ```rust
//! use ai_gate_rust::resilience::rate_limiter::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> ai_gate_rust::Result<()> {
//! let limiter = RateLimiter::new("openai", 500, 10_000);
//! let waited = limiter.acquire(&CancellationToken::new()).await?;
//! assert!(waited.is_zero());
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry
//!
//! ```rust
//! use ai_gate_rust::resilience::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(40));
//! assert_eq!(policy.backoff(1), Duration::from_millis(20));
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterSnapshot, RateWindow};
pub use retry::{Decision, RetryPolicy};
