//! Mention-flood handling through the full admission flow.

use ai_gate_rust::guardrails::mention::DEFAULT_DEFLECTION;
use ai_gate_rust::pipeline::{StreamLimits, TripReason};
use ai_gate_rust::{
    Admission, AdmissionConfig, BoxStream, CancelHandle, ConversationKey, Reply, ResponsePipeline,
    StreamProfile, StreamingEvent,
};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every prompt it is asked to answer.
struct SpyPipeline {
    prompts: Mutex<Vec<String>>,
    reply: Vec<String>,
}

impl SpyPipeline {
    fn replying(parts: &[&str]) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponsePipeline for SpyPipeline {
    async fn open_stream(
        &self,
        prompt: &str,
        _cancel: CancelHandle,
    ) -> ai_gate_rust::Result<BoxStream<'static, StreamingEvent>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let events: Vec<_> = self
            .reply
            .iter()
            .cloned()
            .map(|t| Ok(StreamingEvent::text(t)))
            .collect();
        Ok(Box::pin(tokio_stream::iter(events)))
    }
}

fn admission() -> Admission {
    let mut config = AdmissionConfig::default();
    config.mention.bot_user_id = Some("UBOT".to_string());
    Admission::from_config(&config).unwrap()
}

fn key() -> ConversationKey {
    ConversationKey::from_event("C1", Some("1700.1"), Some("U1"), false)
}

#[tokio::test]
async fn three_mentions_are_admitted_and_stripped() {
    let admission = admission();
    let spy = SpyPipeline::replying(&["Sure", ", here it is."]);

    let reply = admission
        .respond(
            &key(),
            "openai",
            "<@UBOT> <@UBOT> <@UBOT> summarize the thread",
            StreamProfile::General,
            &spy,
        )
        .await
        .unwrap();

    assert_eq!(spy.calls(), vec!["summarize the thread".to_string()]);
    assert_eq!(reply.text(), "Sure, here it is.");
    match reply {
        Reply::Answered { truncated, stats, .. } => {
            assert!(truncated.is_none());
            assert_eq!(stats.service, "openai");
        }
        other => panic!("expected an answer, got {:?}", other),
    }
}

#[tokio::test]
async fn four_mentions_are_deflected_without_calling_the_pipeline() {
    let admission = admission();
    let spy = SpyPipeline::replying(&["unused"]);

    let reply = admission
        .respond(
            &key(),
            "openai",
            "<@UBOT> <@UBOT> <@UBOT> <@UBOT> hello?",
            StreamProfile::General,
            &spy,
        )
        .await
        .unwrap();

    assert!(reply.is_deflected());
    assert_eq!(reply.text(), DEFAULT_DEFLECTION);
    assert!(spy.calls().is_empty());
    assert_eq!(admission.governor().stats("openai").total_requests, 0);
}

#[tokio::test]
async fn runaway_reply_is_truncated_with_notice() {
    let admission = admission().with_stream_limits(
        StreamLimits::general().with_max_events(2),
        StreamLimits::automation(),
    );
    let spy = SpyPipeline::replying(&["one ", "two ", "three ", "four "]);

    let reply = admission
        .respond(&key(), "openai", "<@UBOT> count", StreamProfile::General, &spy)
        .await
        .unwrap();

    match &reply {
        Reply::Answered { truncated, .. } => {
            assert_eq!(
                truncated,
                &Some(TripReason::EventCount { count: 3, limit: 2 })
            );
        }
        other => panic!("expected an answer, got {:?}", other),
    }
    assert!(reply.text().starts_with("one two "));
    assert!(reply.text().ends_with(TripReason::EventCount { count: 3, limit: 2 }.notice()));
    // a trip is not an upstream failure
    assert_eq!(admission.governor().stats("openai").success_count, 1);
}
