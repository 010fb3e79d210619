use crate::{Error, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(3600);

/// Fixed-capacity counter over a trailing time window.
///
/// Keeps the admission timestamps of the last `window`; anything older is
/// evicted lazily on the next check. A cap of 0 disables the window.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window: Duration,
    cap: u32,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(window: Duration, cap: u32) -> Self {
        Self {
            window,
            cap,
            stamps: VecDeque::new(),
        }
    }

    pub fn per_minute(cap: u32) -> Self {
        Self::new(MINUTE, cap)
    }

    pub fn per_hour(cap: u32) -> Self {
        Self::new(HOUR, cap)
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_unlimited(&self) -> bool {
        self.cap == 0
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of admissions inside the trailing window.
    pub fn used(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.stamps.len()
    }

    pub fn has_capacity(&mut self, now: Instant) -> bool {
        if self.is_unlimited() {
            return true;
        }
        self.used(now) < self.cap as usize
    }

    /// Time until the oldest entry leaves the window, or zero if a slot is free.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        if self.has_capacity(now) {
            return Duration::ZERO;
        }
        match self.stamps.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    pub fn record(&mut self, now: Instant) {
        if !self.is_unlimited() {
            self.stamps.push_back(now);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub per_minute_cap: u32,
    pub per_hour_cap: u32,
    pub minute_used: usize,
    pub hour_used: usize,
    /// Estimated wait time until a call would be admitted (ms), if currently full.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug)]
struct State {
    minute: RateWindow,
    hour: RateWindow,
}

impl State {
    fn wait_time(&mut self, now: Instant) -> Duration {
        self.minute.wait_time(now).max(self.hour.wait_time(now))
    }
}

/// Minute + hour sliding-window limiter for one upstream service.
///
/// - Calls are only ever delayed, never rejected
/// - Waiters are not ordered; whoever re-checks first after capacity frees wins
pub struct RateLimiter {
    service: String,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(service: impl Into<String>, per_minute_cap: u32, per_hour_cap: u32) -> Self {
        Self {
            service: service.into(),
            state: Mutex::new(State {
                minute: RateWindow::per_minute(per_minute_cap),
                hour: RateWindow::per_hour(per_hour_cap),
            }),
        }
    }

    /// Wait until both windows have room, then record the admission.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration> {
        let started = Instant::now();

        loop {
            let wait_duration = {
                let mut st = self.state.lock().await;
                let now = Instant::now();
                let wait = st.wait_time(now);
                if wait.is_zero() {
                    st.minute.record(now);
                    st.hour.record(now);
                    return Ok(now.saturating_duration_since(started));
                }
                wait
            };

            warn!(
                service = self.service.as_str(),
                wait_ms = wait_duration.as_millis() as u64,
                "rate limit reached, delaying call"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled("rate_limiter"));
                }
                _ = tokio::time::sleep(wait_duration) => {}
            }
        }
    }

    /// Try to admit without waiting, returns true if successful
    pub async fn try_acquire(&self) -> bool {
        let mut st = self.state.lock().await;
        let now = Instant::now();
        if st.wait_time(now).is_zero() {
            st.minute.record(now);
            st.hour.record(now);
            true
        } else {
            false
        }
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut st = self.state.lock().await;
        let now = Instant::now();
        let wait = st.wait_time(now);
        RateLimiterSnapshot {
            per_minute_cap: st.minute.cap(),
            per_hour_cap: st.hour.cap(),
            minute_used: st.minute.used(now),
            hour_used: st.hour.used(now),
            estimated_wait_ms: if wait.is_zero() {
                None
            } else {
                Some(wait.as_millis() as u64)
            },
        }
    }
}
