//! Mention-flood guard for inbound chat messages.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MENTION_THRESHOLD: usize = 3;

pub const DEFAULT_DEFLECTION: &str =
    "That message mentions me too many times. Mention me once and I'll take a look.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionGuardConfig {
    /// Messages with more self-mentions than this are deflected.
    pub threshold: usize,
    /// Bot user id; without it any user mention counts.
    pub bot_user_id: Option<String>,
    pub deflection: String,
}

impl Default for MentionGuardConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MENTION_THRESHOLD,
            bot_user_id: None,
            deflection: DEFAULT_DEFLECTION.to_string(),
        }
    }
}

/// Result of [`MentionGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionCheck {
    pub admit: bool,
    /// Fixed reply to send instead of running the pipeline.
    pub deflection: Option<String>,
    pub mentions: usize,
}

impl MentionCheck {
    pub fn is_flood(&self) -> bool {
        !self.admit
    }
}

#[derive(Debug, Clone)]
pub struct MentionGuard {
    pattern: Regex,
    threshold: usize,
    deflection: String,
}

impl MentionGuard {
    /// Guard counting `<@BOT_ID>` tokens, including the `<@BOT_ID|name>` form.
    pub fn new(bot_user_id: Option<&str>) -> Self {
        Self {
            pattern: mention_pattern(bot_user_id),
            threshold: DEFAULT_MENTION_THRESHOLD,
            deflection: DEFAULT_DEFLECTION.to_string(),
        }
    }

    pub fn from_config(config: &MentionGuardConfig) -> Self {
        Self::new(config.bot_user_id.as_deref())
            .with_threshold(config.threshold)
            .with_deflection(config.deflection.clone())
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_deflection(mut self, text: impl Into<String>) -> Self {
        self.deflection = text.into();
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }

    /// Count self-mentions; anything above the threshold is deflected.
    pub fn check(&self, text: &str) -> MentionCheck {
        let mentions = self.count(text);
        if mentions > self.threshold {
            warn!(
                mentions,
                threshold = self.threshold,
                "mention flood rejected"
            );
            return MentionCheck {
                admit: false,
                deflection: Some(self.deflection.clone()),
                mentions,
            };
        }
        MentionCheck {
            admit: true,
            deflection: None,
            mentions,
        }
    }

    /// Remove self-mention tokens and collapse the whitespace they leave.
    pub fn strip_mentions(&self, text: &str) -> String {
        let stripped = self.pattern.replace_all(text, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for MentionGuard {
    fn default() -> Self {
        Self::new(None)
    }
}

fn mention_pattern(bot_user_id: Option<&str>) -> Regex {
    let id = match bot_user_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => regex::escape(id),
        None => "[A-Z0-9]+".to_string(),
    };
    // Escaped id keeps the expression valid for any input.
    Regex::new(&format!(r"<@{}(?:\|[^>]*)?>", id)).expect("escaped mention pattern")
}

/// One-shot check with the default threshold.
pub fn check_mention_flood(text: &str, bot_user_id: &str) -> MentionCheck {
    MentionGuard::new(Some(bot_user_id)).check(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        let guard = MentionGuard::new(Some("UBOT"));
        let three = "<@UBOT> <@UBOT> <@UBOT> hi";
        let four = "<@UBOT> <@UBOT> <@UBOT> <@UBOT> hi";

        let ok = guard.check(three);
        assert!(ok.admit);
        assert_eq!(ok.mentions, 3);
        assert!(ok.deflection.is_none());

        let flood = guard.check(four);
        assert!(flood.is_flood());
        assert_eq!(flood.mentions, 4);
        assert_eq!(flood.deflection.as_deref(), Some(DEFAULT_DEFLECTION));
    }

    #[test]
    fn test_only_self_mentions_count() {
        let guard = MentionGuard::new(Some("UBOT"));
        assert_eq!(guard.count("<@UBOT> <@UOTHER> <@UOTHER> <@UOTHER> <@UOTHER>"), 1);
        assert_eq!(guard.count("<@UBOT|livia> ping"), 1);
    }

    #[test]
    fn test_unknown_bot_counts_any_mention() {
        let guard = MentionGuard::default();
        assert_eq!(guard.count("<@U1> <@U2> plain @U3"), 2);
    }

    #[test]
    fn test_custom_threshold_and_text() {
        let guard = MentionGuard::new(Some("UBOT"))
            .with_threshold(1)
            .with_deflection("nope");
        let check = guard.check("<@UBOT><@UBOT>");
        assert!(!check.admit);
        assert_eq!(check.deflection.as_deref(), Some("nope"));
    }

    #[test]
    fn test_strip_mentions() {
        let guard = MentionGuard::new(Some("UBOT"));
        assert_eq!(
            guard.strip_mentions("<@UBOT>  summarize   <@UOTHER>'s doc"),
            "summarize <@UOTHER>'s doc"
        );
    }

    #[test]
    fn test_bot_id_is_escaped() {
        let guard = MentionGuard::new(Some("U.*"));
        assert_eq!(guard.count("<@UBOT>"), 0);
        assert_eq!(guard.count("<@U.*>"), 1);
    }

    #[test]
    fn test_free_function_uses_default_threshold() {
        assert!(check_mention_flood("<@B> <@B> <@B>", "B").admit);
        assert!(!check_mention_flood("<@B> <@B> <@B> <@B>", "B").admit);
    }
}
