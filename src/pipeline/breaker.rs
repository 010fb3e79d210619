//! Circuit breaker for a single in-progress event stream.
//!
//! ```text
//! Running ──source ends──────────▶ Completed
//!    │  ──bound exceeded─────────▶ Tripped(reason)   (fallback event, source cancelled)
//!    │  ──source yields Err──────▶ UpstreamError     (error forwarded)
//!    └──cancel handle fired──────▶ Cancelled         (Error::Cancelled)
//! ```
//!
//! Every event is checked before it is forwarded, so the event that crosses
//! a bound is never delivered. The duration bound is also enforced while
//! waiting, which catches an upstream that stops sending.

use crate::config::serde_millis;
use crate::governor::types::CancelHandle;
use crate::pipeline::repetition::{RepetitionDetector, DEFAULT_NGRAM, DEFAULT_WINDOW};
use crate::types::events::StreamingEvent;
use crate::{BoxStream, Error, Result};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bounds applied to one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamLimits {
    #[serde(rename = "max_duration_ms", with = "serde_millis")]
    pub max_duration: Duration,
    pub max_events: usize,
    /// Counted in chars of content deltas.
    pub max_chars: usize,
    /// Trips when the trailing-window ratio reaches this value; 0 disables.
    pub repetition_threshold: f64,
    pub repetition_window: usize,
    pub repetition_ngram: usize,
}

impl StreamLimits {
    /// Interactive LLM responses.
    pub fn general() -> Self {
        Self {
            max_duration: Duration::from_secs(120),
            max_events: 1000,
            max_chars: 8000,
            repetition_threshold: 0.30,
            repetition_window: DEFAULT_WINDOW,
            repetition_ngram: DEFAULT_NGRAM,
        }
    }

    /// Remote automation calls, which are expected to finish sooner.
    pub fn automation() -> Self {
        Self {
            max_duration: Duration::from_secs(90),
            max_events: 500,
            ..Self::general()
        }
    }

    pub fn with_max_duration(mut self, d: Duration) -> Self {
        self.max_duration = d;
        self
    }

    pub fn with_max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn with_max_chars(mut self, n: usize) -> Self {
        self.max_chars = n;
        self
    }

    pub fn with_repetition_threshold(mut self, threshold: f64) -> Self {
        self.repetition_threshold = threshold;
        self
    }
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self::general()
    }
}

/// Which bound a stream crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripReason {
    Duration { elapsed_ms: u64, limit_ms: u64 },
    EventCount { count: usize, limit: usize },
    Length { chars: usize, limit: usize },
    Repetition { ratio: f64, threshold: f64 },
}

impl TripReason {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Duration { .. } => "duration",
            Self::EventCount { .. } => "event_count",
            Self::Length { .. } => "length",
            Self::Repetition { .. } => "repetition",
        }
    }

    /// Text appended to the partial reply in place of the rest of the stream.
    pub fn notice(&self) -> &'static str {
        match self {
            Self::Duration { .. } => "_Response stopped: it was taking too long._",
            Self::EventCount { .. } | Self::Length { .. } => {
                "_Response stopped: it grew beyond the allowed size._"
            }
            Self::Repetition { .. } => "_Response stopped: it started repeating itself._",
        }
    }
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration { elapsed_ms, limit_ms } => {
                write!(f, "stream ran {}ms (limit {}ms)", elapsed_ms, limit_ms)
            }
            Self::EventCount { count, limit } => write!(f, "{} events (limit {})", count, limit),
            Self::Length { chars, limit } => write!(f, "{} chars (limit {})", chars, limit),
            Self::Repetition { ratio, threshold } => {
                write!(f, "repetition ratio {:.2} (threshold {:.2})", ratio, threshold)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakerState {
    Running,
    Completed,
    Tripped(TripReason),
    UpstreamError,
    Cancelled,
}

impl BreakerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Shared view of a wrapped stream's state.
#[derive(Debug, Clone)]
pub struct BreakerStatus {
    inner: Arc<Mutex<BreakerState>>,
}

impl BreakerStatus {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerState::Running)),
        }
    }

    fn set(&self, state: BreakerState) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn trip_reason(&self) -> Option<TripReason> {
        match self.state() {
            BreakerState::Tripped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.trip_reason().is_some()
    }
}

/// Counters for one stream.
#[derive(Debug)]
struct StreamTracker {
    limits: StreamLimits,
    start: Instant,
    event_count: usize,
    emitted_chars: usize,
    tail: RepetitionDetector,
}

impl StreamTracker {
    fn new(limits: StreamLimits) -> Self {
        Self {
            tail: RepetitionDetector::new(limits.repetition_window, limits.repetition_ngram),
            start: Instant::now(),
            event_count: 0,
            emitted_chars: 0,
            limits,
        }
    }

    fn deadline(&self) -> Instant {
        self.start + self.limits.max_duration
    }

    fn duration_trip(&self) -> TripReason {
        TripReason::Duration {
            elapsed_ms: self.start.elapsed().as_millis() as u64,
            limit_ms: self.limits.max_duration.as_millis() as u64,
        }
    }

    fn observe(&mut self, event: &StreamingEvent) -> Option<TripReason> {
        self.event_count += 1;
        if let Some(text) = event.content() {
            self.emitted_chars += text.chars().count();
            self.tail.push_str(text);
        }

        if self.start.elapsed() > self.limits.max_duration {
            return Some(self.duration_trip());
        }
        if self.event_count > self.limits.max_events {
            return Some(TripReason::EventCount {
                count: self.event_count,
                limit: self.limits.max_events,
            });
        }
        if self.emitted_chars > self.limits.max_chars {
            return Some(TripReason::Length {
                chars: self.emitted_chars,
                limit: self.limits.max_chars,
            });
        }
        if self.limits.repetition_threshold > 0.0 {
            if let Some(ratio) = self.tail.ratio() {
                if ratio >= self.limits.repetition_threshold {
                    return Some(TripReason::Repetition {
                        ratio,
                        threshold: self.limits.repetition_threshold,
                    });
                }
            }
        }
        None
    }
}

/// Wraps an upstream event stream with [`StreamLimits`].
#[derive(Debug, Clone)]
pub struct StreamCircuitBreaker {
    limits: StreamLimits,
    cancel: CancelHandle,
    label: String,
}

impl StreamCircuitBreaker {
    pub fn new(limits: StreamLimits) -> Self {
        Self {
            limits,
            cancel: CancelHandle::new(),
            label: "stream".to_string(),
        }
    }

    /// Handle fired when the breaker trips; firing it from outside ends the
    /// stream with [`Error::Cancelled`].
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Name used in log lines (usually the service).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn limits(&self) -> &StreamLimits {
        &self.limits
    }

    /// Guard `source`. The clock starts now.
    pub fn wrap<S>(self, source: S) -> (BoxStream<'static, StreamingEvent>, BreakerStatus)
    where
        S: Stream<Item = Result<StreamingEvent>> + Send + Unpin + 'static,
    {
        let status = BreakerStatus::new();
        let guarded = Guarded {
            source: Some(source),
            tracker: StreamTracker::new(self.limits),
            cancel: self.cancel,
            status: status.clone(),
            label: self.label,
        };

        let stream = stream::unfold(guarded, |mut g| async move {
            let deadline = g.tracker.deadline();
            let source = g.source.as_mut()?;

            let step = tokio::select! {
                biased;
                _ = g.cancel.cancelled() => Step::Cancelled,
                next = tokio::time::timeout_at(deadline, source.next()) => match next {
                    Err(_) => Step::Timeout,
                    Ok(None) => Step::End,
                    Ok(Some(Ok(event))) => Step::Event(event),
                    Ok(Some(Err(e))) => Step::Failed(e),
                },
            };

            match step {
                Step::Event(event) => match g.tracker.observe(&event) {
                    None => Some((Ok(event), g)),
                    Some(reason) => {
                        let fallback = g.trip(reason);
                        Some((Ok(fallback), g))
                    }
                },
                Step::Timeout => {
                    let reason = g.tracker.duration_trip();
                    let fallback = g.trip(reason);
                    Some((Ok(fallback), g))
                }
                Step::End => {
                    debug!(
                        stream = g.label.as_str(),
                        events = g.tracker.event_count,
                        chars = g.tracker.emitted_chars,
                        "stream completed"
                    );
                    g.finish(BreakerState::Completed);
                    None
                }
                Step::Failed(e) => {
                    g.finish(BreakerState::UpstreamError);
                    Some((Err(e), g))
                }
                Step::Cancelled => {
                    debug!(stream = g.label.as_str(), "stream cancelled");
                    g.finish(BreakerState::Cancelled);
                    Some((Err(Error::cancelled("stream_breaker")), g))
                }
            }
        });

        (Box::pin(stream), status)
    }
}

enum Step {
    Event(StreamingEvent),
    Timeout,
    End,
    Failed(Error),
    Cancelled,
}

struct Guarded<S> {
    source: Option<S>,
    tracker: StreamTracker,
    cancel: CancelHandle,
    status: BreakerStatus,
    label: String,
}

impl<S> Guarded<S> {
    fn finish(&mut self, state: BreakerState) {
        self.source = None;
        self.status.set(state);
    }

    fn trip(&mut self, reason: TripReason) -> StreamingEvent {
        warn!(
            stream = self.label.as_str(),
            reason = reason.kind(),
            detail = %reason,
            events = self.tracker.event_count,
            chars = self.tracker.emitted_chars,
            "stream circuit breaker tripped"
        );
        self.finish(BreakerState::Tripped(reason.clone()));
        self.cancel.cancel();
        StreamingEvent::CircuitTripped {
            notice: reason.notice().to_string(),
            reason,
        }
    }
}

/// Guard `source` with `limits` and a fresh cancel handle.
pub fn wrap_stream<S>(source: S, limits: StreamLimits) -> (BoxStream<'static, StreamingEvent>, BreakerStatus)
where
    S: Stream<Item = Result<StreamingEvent>> + Send + Unpin + 'static,
{
    StreamCircuitBreaker::new(limits).wrap(source)
}

/// Text gathered from a guarded stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// Content deltas in order, followed by the trip notice if the breaker fired.
    pub text: String,
    pub events: usize,
    pub tripped: Option<TripReason>,
}

impl StreamOutcome {
    pub fn is_truncated(&self) -> bool {
        self.tripped.is_some()
    }
}

/// Drain a guarded stream into its text.
///
/// A trip is not an error: the result is the partial text plus the notice.
pub async fn collect_text<S>(mut stream: S) -> Result<StreamOutcome>
where
    S: Stream<Item = Result<StreamingEvent>> + Unpin,
{
    let mut outcome = StreamOutcome {
        text: String::new(),
        events: 0,
        tripped: None,
    };
    while let Some(item) = stream.next().await {
        let event = item?;
        outcome.events += 1;
        match event {
            StreamingEvent::PartialContentDelta { content, .. } => outcome.text.push_str(&content),
            StreamingEvent::CircuitTripped { reason, notice } => {
                if !outcome.text.is_empty() {
                    outcome.text.push_str("\n\n");
                }
                outcome.text.push_str(&notice);
                outcome.tripped = Some(reason);
            }
            _ => {}
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::StandardErrorCode;

    fn deltas(parts: &[&str]) -> Vec<Result<StreamingEvent>> {
        parts.iter().map(|p| Ok(StreamingEvent::text(*p))).collect()
    }

    #[tokio::test]
    async fn test_under_limits_passes_through() {
        let source = stream::iter(deltas(&["Hello", ", ", "world"]));
        let (guarded, status) = wrap_stream(source, StreamLimits::general());
        let events: Vec<_> = guarded.collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[2].as_ref().unwrap(), &StreamingEvent::text("world"));
        assert_eq!(status.state(), BreakerState::Completed);
    }

    #[tokio::test]
    async fn test_event_bound_trips_before_forwarding() {
        let source = stream::iter(deltas(&["a", "b", "c", "d"]));
        let limits = StreamLimits::general().with_max_events(2);
        let (guarded, status) = wrap_stream(source, limits);
        let events: Vec<_> = guarded.map(|e| e.unwrap()).collect().await;

        assert_eq!(events.len(), 3);
        assert!(events[2].is_trip());
        assert_eq!(
            status.trip_reason(),
            Some(TripReason::EventCount { count: 3, limit: 2 })
        );
    }

    #[tokio::test]
    async fn test_upstream_error_is_forwarded_once() {
        let source = stream::iter(vec![
            Ok(StreamingEvent::text("partial")),
            Err(Error::transient(StandardErrorCode::ServerError, "reset")),
            Ok(StreamingEvent::text("never")),
        ]);
        let (guarded, status) = wrap_stream(source, StreamLimits::general());
        let events: Vec<_> = guarded.collect().await;

        assert_eq!(events.len(), 2);
        assert!(events[1].is_err());
        assert_eq!(status.state(), BreakerState::UpstreamError);
    }

    #[tokio::test]
    async fn test_external_cancel_ends_with_cancelled() {
        let breaker = StreamCircuitBreaker::new(StreamLimits::general());
        let cancel = breaker.cancel_handle();
        let (mut guarded, status) = breaker.wrap(stream::pending::<Result<StreamingEvent>>());

        cancel.cancel();
        let err = guarded.next().await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(guarded.next().await.is_none());
        assert_eq!(status.state(), BreakerState::Cancelled);
    }

    #[tokio::test]
    async fn test_collect_text_appends_notice() {
        let source = stream::iter(deltas(&["abcd", "efgh", "ijkl"]));
        let (guarded, _) = wrap_stream(source, StreamLimits::general().with_max_chars(8));
        let outcome = collect_text(guarded).await.unwrap();

        assert!(outcome.is_truncated());
        assert_eq!(
            outcome.text,
            format!("abcdefgh\n\n{}", TripReason::Length { chars: 12, limit: 8 }.notice())
        );
    }

    #[test]
    fn test_presets() {
        let a = StreamLimits::automation();
        assert_eq!(a.max_duration, Duration::from_secs(90));
        assert_eq!(a.max_events, 500);
        assert_eq!(a.max_chars, StreamLimits::general().max_chars);
    }

    #[test]
    fn test_limits_yaml_uses_millis() {
        let limits: StreamLimits = serde_yaml::from_str("max_duration_ms: 1500\n").unwrap();
        assert_eq!(limits.max_duration, Duration::from_millis(1500));
        assert_eq!(limits.max_events, 1000);
    }
}
