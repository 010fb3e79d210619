//! Streaming safety for generative responses.
//!
//! ```text
//! upstream events ─▶ StreamCircuitBreaker ─▶ caller
//!                        │ trip
//!                        ▼
//!                 cancel upstream, emit CircuitTripped, end
//! ```
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StreamCircuitBreaker`] | Bounds one stream by duration, events, length and repetition |
//! | [`StreamLimits`] | Bounds, with `general()` and `automation()` presets |
//! | [`BreakerStatus`] | Shared handle reporting the breaker's state |
//! | [`RepetitionDetector`] | Trailing-window n-gram loop detector |
//! | [`collect_text`] | Drains a guarded stream into reply text |
//!
//! ```rust
//! use ai_gate_rust::pipeline::{collect_text, wrap_stream, StreamLimits};
//! use ai_gate_rust::StreamingEvent;
//! use futures::stream;
//!
//! # async fn demo() -> ai_gate_rust::Result<()> {
//! let source = stream::iter(vec![Ok(StreamingEvent::text("hello"))]);
//! let (guarded, status) = wrap_stream(source, StreamLimits::general());
//! let outcome = collect_text(guarded).await?;
//! assert_eq!(outcome.text, "hello");
//! assert!(!status.is_tripped());
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod repetition;

pub use breaker::{
    collect_text, wrap_stream, BreakerState, BreakerStatus, StreamCircuitBreaker, StreamLimits,
    StreamOutcome, TripReason,
};
pub use repetition::RepetitionDetector;
