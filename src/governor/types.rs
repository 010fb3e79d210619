use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call bookkeeping returned by [`super::ConcurrencyGovernor::execute_with_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CallStats {
    pub call_id: String,
    pub service: String,
    /// Total invocations of the unit of work (first attempt included).
    pub attempts: u32,
    pub retry_count: u32,
    /// Time spent held back by the rate windows.
    pub rate_wait: Duration,
    /// Time spent waiting for a concurrency slot.
    pub queue_wait: Duration,
    /// From concurrency admission to completion.
    pub duration: Duration,
}

/// Caller-side handle that aborts governor waits, retries and guarded streams.
///
/// Cloning shares the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A handle cancelled together with this one, but which can also be
    /// cancelled on its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl From<CancellationToken> for CancelHandle {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}
