//! End-to-end admission for one inbound chat message.
//!
//! ```text
//! message ─▶ MentionGuard ─▶ ConversationGate ─▶ ConcurrencyGovernor ──────────────────────▶ reply
//!              │ flood           (per key)         │ slot + retry per attempt:
//!              ▼                                   └─ open ─▶ StreamCircuitBreaker ─▶ drain
//!           deflection
//! ```

use crate::config::AdmissionConfig;
use crate::conversation::{ConversationGate, ConversationKey};
use crate::governor::{CallStats, CancelHandle, ConcurrencyGovernor, GovernorBuilder};
use crate::guardrails::MentionGuard;
use crate::pipeline::breaker::{collect_text, StreamCircuitBreaker, StreamLimits, TripReason};
use crate::types::events::StreamingEvent;
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The generative side: opens one upstream response stream.
///
/// `cancel` fires when the breaker trips or the caller gives up; producers
/// should stop when it does. Called once per attempt.
#[async_trait]
pub trait ResponsePipeline: Send + Sync {
    async fn open_stream(
        &self,
        prompt: &str,
        cancel: CancelHandle,
    ) -> Result<BoxStream<'static, StreamingEvent>>;
}

/// Which stream bounds apply to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamProfile {
    #[default]
    General,
    Automation,
}

#[derive(Debug, Clone)]
pub enum Reply {
    /// Rejected by the mention guard; the pipeline never ran.
    Deflected { text: String },
    Answered {
        text: String,
        truncated: Option<TripReason>,
        stats: CallStats,
    },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Deflected { text } | Reply::Answered { text, .. } => text,
        }
    }

    pub fn is_deflected(&self) -> bool {
        matches!(self, Reply::Deflected { .. })
    }
}

pub struct Admission {
    governor: Arc<ConcurrencyGovernor>,
    gate: ConversationGate,
    mentions: MentionGuard,
    general: StreamLimits,
    automation: StreamLimits,
}

impl Admission {
    pub fn new(governor: Arc<ConcurrencyGovernor>, mentions: MentionGuard) -> Self {
        Self {
            governor,
            gate: ConversationGate::new(),
            mentions,
            general: StreamLimits::general(),
            automation: StreamLimits::automation(),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Result<Self> {
        let governor = GovernorBuilder::from_config(config).build()?;
        Ok(Self::new(Arc::new(governor), MentionGuard::from_config(&config.mention))
            .with_stream_limits(config.stream.clone(), config.automation_stream.clone()))
    }

    pub fn with_stream_limits(mut self, general: StreamLimits, automation: StreamLimits) -> Self {
        self.general = general;
        self.automation = automation;
        self
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    pub fn gate(&self) -> &ConversationGate {
        &self.gate
    }

    fn limits(&self, profile: StreamProfile) -> &StreamLimits {
        match profile {
            StreamProfile::General => &self.general,
            StreamProfile::Automation => &self.automation,
        }
    }

    pub async fn respond(
        &self,
        key: &ConversationKey,
        service: &str,
        raw_text: &str,
        profile: StreamProfile,
        pipeline: &dyn ResponsePipeline,
    ) -> Result<Reply> {
        self.respond_with_cancel(key, service, raw_text, profile, pipeline, &CancelHandle::new())
            .await
    }

    /// Run one message through every stage. Upstream failures surface as
    /// `Err`; show [`Error::user_message`](crate::Error::user_message) to the user.
    pub async fn respond_with_cancel(
        &self,
        key: &ConversationKey,
        service: &str,
        raw_text: &str,
        profile: StreamProfile,
        pipeline: &dyn ResponsePipeline,
        cancel: &CancelHandle,
    ) -> Result<Reply> {
        let check = self.mentions.check(raw_text);
        if let Some(text) = check.deflection {
            return Ok(Reply::Deflected { text });
        }
        let prompt = self.mentions.strip_mentions(raw_text);

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled("conversation_gate")),
            permit = self.gate.acquire(key) => permit,
        };

        // Each attempt opens, guards and drains its own stream while holding
        // the service slot; a mid-stream upstream error retries from scratch.
        let prompt = prompt.as_str();
        let limits = self.limits(profile);
        let (outcome, stats) = self
            .governor
            .execute_with_cancel_and_stats(service, cancel, || async move {
                let attempt_cancel = cancel.child();
                let stream = pipeline.open_stream(prompt, attempt_cancel.clone()).await?;
                let (guarded, _status) = StreamCircuitBreaker::new(limits.clone())
                    .with_cancel(attempt_cancel)
                    .with_label(service)
                    .wrap(stream);
                collect_text(guarded).await
            })
            .await?;

        debug!(
            conversation = %key,
            service,
            call_id = stats.call_id.as_str(),
            events = outcome.events,
            truncated = outcome.is_truncated(),
            "reply ready"
        );
        Ok(Reply::Answered {
            text: outcome.text,
            truncated: outcome.tripped,
            stats,
        })
    }
}
