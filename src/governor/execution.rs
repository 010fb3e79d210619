//! Governed execution: rate wait, slot, retry loop, stats.

use crate::governor::core::ConcurrencyGovernor;
use crate::governor::types::{CallStats, CancelHandle};
use crate::guardrails::redact::redact_secrets;
use crate::resilience::retry::Decision;
use crate::{Error, ErrorContext, Result};
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

impl ConcurrencyGovernor {
    /// Run one upstream call under the service's rate windows, concurrency
    /// slot and retry policy.
    ///
    /// `op` performs exactly one upstream call and is invoked again for
    /// every retry.
    pub async fn execute<T, F, Fut>(&self, service: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (value, _) = self
            .execute_with_cancel_and_stats(service, &CancelHandle::new(), op)
            .await?;
        Ok(value)
    }

    /// Like [`execute`](Self::execute), but every wait can be aborted through `cancel`.
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        service: &str,
        cancel: &CancelHandle,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (value, _) = self.execute_with_cancel_and_stats(service, cancel, op).await?;
        Ok(value)
    }

    /// Like [`execute`](Self::execute), also returning per-call stats.
    pub async fn execute_with_stats<T, F, Fut>(&self, service: &str, op: F) -> Result<(T, CallStats)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_cancel_and_stats(service, &CancelHandle::new(), op)
            .await
    }

    pub async fn execute_with_cancel_and_stats<T, F, Fut>(
        &self,
        service: &str,
        cancel: &CancelHandle,
        mut op: F,
    ) -> Result<(T, CallStats)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("governor"));
        }

        let state = self.service_state(service);
        let call_id = Uuid::new_v4().to_string();
        let token = cancel.token();

        // Rate admission records the timestamp; a cancelled wait is never counted.
        let rate_wait = state.rate_limiter.acquire(token).await?;

        let admitted = Instant::now();
        let _permit = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::cancelled("governor")),
            permit = state.semaphore.clone().acquire_owned() => permit.map_err(|_| {
                Error::runtime_with_context(
                    "service semaphore closed",
                    ErrorContext::new()
                        .with_details(format!("service: {}", state.name))
                        .with_source("governor"),
                )
            })?,
        };
        let queue_wait = admitted.elapsed();
        let _in_flight = state.stats.enter();

        let policy = state.limits.retry_policy();
        let mut attempt: u32 = 0;

        let outcome = loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::cancelled("governor")),
                r = op() => r,
            };

            let err = match result {
                Ok(value) => break Ok(value),
                Err(e) => e,
            };

            match policy.decide(&err, attempt) {
                Decision::Retry { delay } => {
                    warn!(
                        service = state.name.as_str(),
                        call_id = call_id.as_str(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        code = err.code().name(),
                        error = %redact_secrets(&err.to_string()),
                        "transient upstream failure, retrying"
                    );
                    let cancelled = tokio::select! {
                        biased;
                        _ = token.cancelled() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                    if cancelled {
                        break Err(Error::cancelled("governor"));
                    }
                    attempt = attempt.saturating_add(1);
                }
                Decision::Fail => break Err(err),
            }
        };

        let duration = admitted.elapsed();
        state.stats.record(outcome.is_ok(), attempt, duration);

        match outcome {
            Ok(value) => {
                debug!(
                    service = state.name.as_str(),
                    call_id = call_id.as_str(),
                    retries = attempt,
                    duration_ms = duration.as_millis() as u64,
                    "upstream call completed"
                );
                let stats = CallStats {
                    call_id,
                    service: state.name.clone(),
                    attempts: attempt + 1,
                    retry_count: attempt,
                    rate_wait,
                    queue_wait,
                    duration,
                };
                Ok((value, stats))
            }
            Err(err) => {
                if err.is_cancelled() {
                    debug!(
                        service = state.name.as_str(),
                        call_id = call_id.as_str(),
                        "upstream call cancelled"
                    );
                } else {
                    error!(
                        service = state.name.as_str(),
                        call_id = call_id.as_str(),
                        attempts = attempt + 1,
                        code = err.code().name(),
                        category = err.code().category(),
                        error = %redact_secrets(&err.to_string()),
                        "upstream call failed"
                    );
                }
                Err(err)
            }
        }
    }
}
