//! Per-service concurrency and rate governor.
//!
//! Every outbound call goes through [`ConcurrencyGovernor::execute`], which
//! applies, in order:
//!
//! 1. rate admission against the service's minute and hour windows (waits, never rejects)
//! 2. a concurrency slot from the service's semaphore
//! 3. the unit of work, retried with exponential backoff on transient errors
//! 4. stats recording
//!
//! ```rust,no_run
//! use ai_gate_rust::governor::{ConcurrencyGovernor, ServiceLimits};
//!
//! # async fn demo() -> ai_gate_rust::Result<()> {
//! let governor = ConcurrencyGovernor::builder()
//!     .service("openai", ServiceLimits::openai())
//!     .build()?;
//!
//! let reply = governor
//!     .execute("openai", || async { Ok::<_, ai_gate_rust::Error>("hi".to_string()) })
//!     .await?;
//! println!("{} ({:?})", reply, governor.stats("openai"));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod core;
mod execution;
pub mod limits;
pub mod signals;
pub mod stats;
pub mod types;

pub use builder::GovernorBuilder;
pub use core::ConcurrencyGovernor;
pub use limits::ServiceLimits;
pub use signals::{InflightSnapshot, SignalsSnapshot};
pub use stats::StatsSnapshot;
pub use types::{CallStats, CancelHandle};

use crate::config::AdmissionConfig;
use tracing::warn;

static GLOBAL_GOVERNOR: once_cell::sync::Lazy<ConcurrencyGovernor> =
    once_cell::sync::Lazy::new(|| {
        let config = AdmissionConfig::load();
        GovernorBuilder::from_config(&config)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "invalid governor configuration, using built-in limits");
                GovernorBuilder::from_config(&AdmissionConfig::default())
                    .build()
                    .unwrap_or_default()
            })
    });

/// Process-wide governor configured from the environment on first use.
pub fn global() -> &'static ConcurrencyGovernor {
    &GLOBAL_GOVERNOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_global_is_shared() {
        let a = global() as *const ConcurrencyGovernor;
        let b = global() as *const ConcurrencyGovernor;
        assert_eq!(a, b);

        global()
            .execute("global-probe", || async { Ok::<_, crate::Error>(()) })
            .await
            .unwrap();
        assert!(global().stats("global-probe").success_count >= 1);
    }
}
