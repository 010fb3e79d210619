//! Secret redaction for log output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Replacement for every masked secret.
pub const REDACTED: &str = "***REDACTED***";

/// Masks credentials that tend to leak into upstream error messages.
#[derive(Debug, Clone)]
pub struct SecretRedactor {
    patterns: Vec<Regex>,
}

impl SecretRedactor {
    /// Redactor for OpenAI-style `sk-` keys and `base64:base64` credential pairs.
    pub fn new() -> Self {
        Self {
            patterns: vec![
                Regex::new(r"sk-[A-Za-z0-9_-]{16,}").expect("static regex"),
                Regex::new(r"\b[A-Za-z0-9+/=]{16,}:[A-Za-z0-9+/=]{16,}\b").expect("static regex"),
            ],
        }
    }

    /// Add an extra pattern; invalid expressions are rejected.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Borrowed input is returned untouched when nothing matches.
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for pattern in &self.patterns {
            if let Cow::Owned(replaced) = pattern.replace_all(&out, REDACTED) {
                out = Cow::Owned(replaced);
            }
        }
        out
    }

    pub fn contains_secret(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

impl Default for SecretRedactor {
    fn default() -> Self {
        Self::new()
    }
}

static REDACTOR: Lazy<SecretRedactor> = Lazy::new(SecretRedactor::new);

/// Redact with the shared default redactor.
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    REDACTOR.redact(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_openai_keys() {
        let msg = "401 invalid key sk-abcdefghijklmnop1234 for org";
        assert_eq!(redact_secrets(msg), "401 invalid key ***REDACTED*** for org");
    }

    #[test]
    fn test_masks_project_keys() {
        let out = redact_secrets("key=sk-proj-AbCdEfGhIjKlMnOpQr");
        assert!(!out.contains("AbCdEf"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn test_masks_base64_pairs() {
        let msg = "auth failed: YWJjZGVmZ2hpamtsbW5vcA==:cXJzdHV2d3h5ejAxMjM0NQ==";
        assert_eq!(redact_secrets(msg), "auth failed: ***REDACTED***");
    }

    #[test]
    fn test_leaves_plain_text_borrowed() {
        let msg = "upstream returned 503";
        assert!(matches!(redact_secrets(msg), Cow::Borrowed(_)));
        assert!(!SecretRedactor::new().contains_secret(msg));
    }

    #[test]
    fn test_short_tokens_are_not_secrets() {
        assert_eq!(redact_secrets("sk-short and a:b"), "sk-short and a:b");
    }

    #[test]
    fn test_custom_pattern() {
        let r = SecretRedactor::new().with_pattern(r"xoxb-[0-9A-Za-z-]+").unwrap();
        assert_eq!(r.redact("token xoxb-123-abc"), "token ***REDACTED***");
        assert!(SecretRedactor::new().with_pattern("(").is_err());
    }
}
