use crate::resilience::rate_limiter::RateLimiterSnapshot;

/// Live runtime signals for one service (facts only, no policy).
///
/// Unlike [`super::StatsSnapshot`] this moves with the clock: rate-window
/// occupancy drains as entries age out.
#[derive(Debug, Clone)]
pub struct SignalsSnapshot {
    pub service: String,
    pub inflight: InflightSnapshot,
    pub rate_limiter: RateLimiterSnapshot,
}

#[derive(Debug, Clone)]
pub struct InflightSnapshot {
    pub max: usize,
    pub available: usize,
    pub in_use: usize,
}

impl SignalsSnapshot {
    /// True when a new call would have to wait for either a slot or the rate windows.
    pub fn saturated(&self) -> bool {
        self.inflight.available == 0 || self.rate_limiter.estimated_wait_ms.is_some()
    }
}
