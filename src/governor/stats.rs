use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free per-service counters.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    retries: AtomicU64,
    latency_us: AtomicU64,
    in_flight: AtomicI64,
}

/// Decrements the in-flight gauge when dropped, so cancelled calls never leak it.
pub(crate) struct InFlightGuard<'a> {
    counter: &'a StatsCounter,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl StatsCounter {
    pub(crate) fn enter(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard { counter: self }
    }

    pub(crate) fn record(&self, success: bool, retries: u32, latency: Duration) {
        self.total.fetch_add(1, Ordering::AcqRel);
        if success {
            self.success.fetch_add(1, Ordering::AcqRel);
        } else {
            self.failure.fetch_add(1, Ordering::AcqRel);
        }
        self.retries.fetch_add(retries as u64, Ordering::AcqRel);
        self.latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::AcqRel);
    }

    /// Zero the cumulative counters. The in-flight gauge reflects live calls
    /// and is left alone.
    pub(crate) fn reset(&self) {
        self.total.store(0, Ordering::Release);
        self.success.store(0, Ordering::Release);
        self.failure.store(0, Ordering::Release);
        self.retries.store(0, Ordering::Release);
        self.latency_us.store(0, Ordering::Release);
    }

    pub(crate) fn snapshot(&self, service: &str) -> StatsSnapshot {
        let total_requests = self.total.load(Ordering::Acquire);
        let latency_us = self.latency_us.load(Ordering::Acquire);
        let total_latency = Duration::from_micros(latency_us);
        let success_count = self.success.load(Ordering::Acquire);
        StatsSnapshot {
            service: service.to_string(),
            total_requests,
            success_count,
            failure_count: self.failure.load(Ordering::Acquire),
            retry_count: self.retries.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire).max(0) as u64,
            total_latency,
            average_latency: if total_requests == 0 {
                Duration::ZERO
            } else {
                Duration::from_micros(latency_us / total_requests)
            },
            success_rate: if total_requests == 0 {
                0.0
            } else {
                success_count as f64 / total_requests as f64 * 100.0
            },
        }
    }
}

/// Point-in-time view of one service's counters.
///
/// Only changes when a call completes (or starts, for `in_flight`), so two
/// reads with no calls in between are equal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub service: String,
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Retries performed across all calls (attempts beyond the first).
    pub retry_count: u64,
    pub in_flight: u64,
    pub total_latency: Duration,
    pub average_latency: Duration,
    /// Percentage of completed calls that succeeded.
    pub success_rate: f64,
}

impl StatsSnapshot {
    pub fn empty(service: &str) -> Self {
        StatsCounter::default().snapshot(service)
    }
}
