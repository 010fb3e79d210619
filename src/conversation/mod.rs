//! Per-conversation admission: at most one response in flight per key.
//!
//! Work for the same [`ConversationKey`] runs strictly in arrival order;
//! unrelated keys never wait on each other. Keys are created on first use
//! and kept for the life of the gate.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Identity of one conversation: a thread (or channel) plus, for direct
/// messages, the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    scope: String,
    user: Option<String>,
}

impl ConversationKey {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Key for an inbound chat event.
    ///
    /// Replies in a thread share the thread's key; top-level messages use
    /// the channel. Direct messages are additionally split per user.
    pub fn from_event(channel: &str, thread_ts: Option<&str>, user: Option<&str>, is_dm: bool) -> Self {
        let scope = match thread_ts.filter(|t| !t.is_empty()) {
            Some(ts) => format!("{}:{}", channel, ts),
            None => channel.to_string(),
        };
        Self {
            scope,
            user: if is_dm { user.map(str::to_string) } else { None },
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}@{}", self.scope, user),
            None => f.write_str(&self.scope),
        }
    }
}

impl From<&str> for ConversationKey {
    fn from(scope: &str) -> Self {
        Self::new(scope)
    }
}

impl From<String> for ConversationKey {
    fn from(scope: String) -> Self {
        Self::new(scope)
    }
}

/// Held while a conversation's response is in progress; dropping it admits
/// the next waiter.
pub struct ConversationPermit {
    key: ConversationKey,
    _guard: OwnedMutexGuard<()>,
}

impl ConversationPermit {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }
}

impl fmt::Debug for ConversationPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationPermit").field("key", &self.key).finish()
    }
}

#[derive(Debug, Default)]
pub struct ConversationGate {
    locks: Mutex<HashMap<ConversationKey, Arc<Mutex<()>>>>,
}

impl ConversationGate {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for the key, returning a permit that holds it until dropped.
    pub async fn acquire(&self, key: &ConversationKey) -> ConversationPermit {
        let lock = self.lock_for(key).await;
        if lock.try_lock().is_err() {
            debug!(conversation = %key, "conversation busy, queueing");
        }
        let guard = lock.lock_owned().await;
        ConversationPermit {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Run `f` while holding the key.
    ///
    /// The key is released on every exit path, including when the returned
    /// future is dropped mid-flight.
    pub async fn with_conversation<T, F, Fut>(&self, key: &ConversationKey, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire(key).await;
        f().await
    }

    /// Whether a response for `key` is currently in progress.
    pub async fn is_busy(&self, key: &ConversationKey) -> bool {
        let locks = self.locks.lock().await;
        match locks.get(key) {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }

    /// Number of conversations seen so far.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
