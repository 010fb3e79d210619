use crate::governor::limits::ServiceLimits;
use crate::governor::signals::{InflightSnapshot, SignalsSnapshot};
use crate::governor::stats::{StatsCounter, StatsSnapshot};
use crate::resilience::rate_limiter::RateLimiter;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Semaphore;
use tracing::info;

/// Everything the governor tracks for one upstream service.
pub(crate) struct ServiceState {
    pub(crate) name: String,
    pub(crate) limits: ServiceLimits,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) stats: StatsCounter,
}

impl ServiceState {
    fn new(name: &str, limits: ServiceLimits) -> Self {
        Self {
            name: name.to_string(),
            semaphore: Arc::new(Semaphore::new(limits.max_concurrent.max(1))),
            rate_limiter: RateLimiter::new(name, limits.per_minute_cap, limits.per_hour_cap),
            stats: StatsCounter::default(),
            limits,
        }
    }
}

/// Per-service concurrency and rate governor.
///
/// Service state is created lazily on first use and lives as long as the
/// governor. Calls to different services never contend with each other.
pub struct ConcurrencyGovernor {
    pub(crate) default_limits: ServiceLimits,
    pub(crate) overrides: HashMap<String, ServiceLimits>,
    services: RwLock<HashMap<String, Arc<ServiceState>>>,
}

impl ConcurrencyGovernor {
    pub(crate) fn from_parts(
        default_limits: ServiceLimits,
        overrides: HashMap<String, ServiceLimits>,
    ) -> Self {
        for (name, limits) in &overrides {
            info!(
                service = name.as_str(),
                max_concurrent = limits.max_concurrent,
                per_minute = limits.per_minute_cap,
                per_hour = limits.per_hour_cap,
                "configured service limits"
            );
        }
        Self {
            default_limits,
            overrides,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Governor with the given fallback limits and no per-service overrides.
    pub fn new(default_limits: ServiceLimits) -> Self {
        Self::from_parts(default_limits, HashMap::new())
    }

    pub fn builder() -> crate::governor::builder::GovernorBuilder {
        crate::governor::builder::GovernorBuilder::new()
    }

    /// Limits a service runs (or will run) with.
    pub fn limits_for(&self, service: &str) -> ServiceLimits {
        self.overrides
            .get(service)
            .cloned()
            .unwrap_or_else(|| self.default_limits.clone())
    }

    pub(crate) fn service_state(&self, service: &str) -> Arc<ServiceState> {
        {
            let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(state) = services.get(service) {
                return state.clone();
            }
        }

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        services
            .entry(service.to_string())
            .or_insert_with(|| {
                let limits = self.limits_for(service);
                info!(
                    service,
                    max_concurrent = limits.max_concurrent,
                    per_minute = limits.per_minute_cap,
                    per_hour = limits.per_hour_cap,
                    retry_attempts = limits.retry_attempts,
                    "service state created"
                );
                Arc::new(ServiceState::new(service, limits))
            })
            .clone()
    }

    fn existing(&self, service: &str) -> Option<Arc<ServiceState>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned()
    }

    /// Counters for one service. Unknown services report all zeros.
    pub fn stats(&self, service: &str) -> StatsSnapshot {
        match self.existing(service) {
            Some(state) => state.stats.snapshot(&state.name),
            None => StatsSnapshot::empty(service),
        }
    }

    /// Counters for every service used so far, sorted by name.
    pub fn all_stats(&self) -> Vec<StatsSnapshot> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<StatsSnapshot> = services
            .values()
            .map(|s| s.stats.snapshot(&s.name))
            .collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }

    /// Reset cumulative counters for one service, or all of them with `None`.
    pub fn reset_stats(&self, service: Option<&str>) {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        match service {
            Some(name) => {
                if let Some(state) = services.get(name) {
                    state.stats.reset();
                }
            }
            None => services.values().for_each(|s| s.stats.reset()),
        }
        info!(service = service.unwrap_or("all"), "statistics reset");
    }

    /// Names of the services used so far.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Snapshot current runtime signals (facts only) for one service.
    pub async fn signals(&self, service: &str) -> SignalsSnapshot {
        let state = self.service_state(service);
        let max = state.limits.max_concurrent;
        let available = state.semaphore.available_permits();
        SignalsSnapshot {
            service: state.name.clone(),
            inflight: InflightSnapshot {
                max,
                available,
                in_use: max.saturating_sub(available),
            },
            rate_limiter: state.rate_limiter.snapshot().await,
        }
    }
}

impl Default for ConcurrencyGovernor {
    fn default() -> Self {
        Self::new(ServiceLimits::default())
    }
}
