//! Inbound and log-side safety checks.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MentionGuard`] | Deflects messages that mention the bot too many times |
//! | [`SecretRedactor`] | Masks API keys before upstream errors reach the logs |
//!
//! ```rust
//! use ai_gate_rust::guardrails::MentionGuard;
//!
//! let guard = MentionGuard::new(Some("U024BE7LH"));
//! let check = guard.check("<@U024BE7LH> what's the deploy status?");
//! assert!(check.admit);
//! assert_eq!(guard.strip_mentions("<@U024BE7LH> hi"), "hi");
//! ```

pub mod mention;
pub mod redact;

pub use mention::{check_mention_flood, MentionCheck, MentionGuard, MentionGuardConfig};
pub use redact::{redact_secrets, SecretRedactor};
