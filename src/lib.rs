//! # ai-gate-rust
//!
//! Admission control and streaming safety for chat bots that call
//! rate-limited, latency-variable upstream services.
//!
//! ## Overview
//!
//! Many conversations call upstream concurrently. This crate keeps them
//! inside each service's concurrency and rate ceilings, retries transient
//! failures, serializes replies within a conversation, and stops any single
//! generated response from running away.
//!
//! ## Key Features
//!
//! - **Governor**: [`ConcurrencyGovernor`] wraps every upstream call with a semaphore,
//!   minute/hour sliding windows and bounded exponential-backoff retry
//! - **Conversation gate**: [`ConversationGate`] admits one reply per conversation at a time
//! - **Mention guard**: [`guardrails::MentionGuard`] deflects mention floods
//! - **Stream breaker**: [`pipeline::StreamCircuitBreaker`] bounds duration, event count,
//!   length and repetition of one stream
//! - **Stats**: per-service counters via [`ConcurrencyGovernor::stats`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_gate_rust::{AdmissionConfig, ConcurrencyGovernor, GovernorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> ai_gate_rust::Result<()> {
//!     let governor = GovernorBuilder::from_config(&AdmissionConfig::load()).build()?;
//!
//!     let answer = governor
//!         .execute("openai", || async { Ok::<_, ai_gate_rust::Error>(42) })
//!         .await?;
//!
//!     println!("{} {:?}", answer, governor.stats("openai"));
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`governor`] | Per-service concurrency, rate and retry governor with stats |
//! | [`resilience`] | Sliding-window rate limiter and retry policy |
//! | [`conversation`] | Per-conversation serialization |
//! | [`guardrails`] | Mention-flood guard and secret redaction |
//! | [`pipeline`] | Stream circuit breaker |
//! | [`admission`] | The composed message flow |
//! | [`transport`] | HTTP response classification |
//! | [`config`] | YAML and environment configuration |

pub mod admission;
pub mod config;
pub mod conversation;
pub mod error_code;
pub mod governor;
pub mod guardrails;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod types;

pub use admission::{Admission, Reply, ResponsePipeline, StreamProfile};
pub use config::AdmissionConfig;
pub use conversation::{ConversationGate, ConversationKey};
pub use governor::{
    CallStats, CancelHandle, ConcurrencyGovernor, GovernorBuilder, ServiceLimits, StatsSnapshot,
};
pub use types::events::StreamingEvent;

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
