//! Configuration surface: YAML file plus `AI_GATE_*` environment overrides.
//!
//! Every option has a default, and a missing or malformed value never fails
//! startup: bad values are logged and ignored.
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `AI_GATE_CONFIG_PATH` | YAML file loaded before env overrides |
//! | `AI_GATE_SERVICES` | Comma-separated extra service names to configure |
//! | `AI_GATE_<SERVICE>_MAX_CONCURRENT` | Concurrency ceiling (`DEFAULT` for unlisted services) |
//! | `AI_GATE_<SERVICE>_RPM` / `_RPH` | Per-minute / per-hour caps, 0 = unlimited |
//! | `AI_GATE_<SERVICE>_RETRY_ATTEMPTS` | Retries after the first attempt |
//! | `AI_GATE_<SERVICE>_BACKOFF_MIN_MS` / `_BACKOFF_MAX_MS` | Backoff bounds |
//! | `AI_GATE_<SERVICE>_JITTER` | `1`/`true` to jitter backoff |
//! | `AI_GATE_STREAM_MAX_DURATION_MS` / `_MAX_EVENTS` / `_MAX_CHARS` / `_REPETITION_THRESHOLD` | General stream bounds |
//! | `AI_GATE_AUTOMATION_STREAM_*` | Same bounds for automation streams |
//! | `AI_GATE_MENTION_FLOOD_THRESHOLD` | Max self-mentions admitted |
//! | `AI_GATE_BOT_USER_ID` | Bot id used to build the `<@ID>` mention token |

use crate::governor::limits::ServiceLimits;
use crate::guardrails::mention::MentionGuardConfig;
use crate::pipeline::breaker::StreamLimits;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const ENV_PREFIX: &str = "AI_GATE";

/// Serialize a `Duration` as whole milliseconds.
pub mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Complete admission-layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Limits for any service without its own entry.
    pub default_limits: ServiceLimits,
    pub services: HashMap<String, ServiceLimits>,
    /// Bounds for general LLM streams.
    pub stream: StreamLimits,
    /// Bounds for remote-automation streams.
    pub automation_stream: StreamLimits,
    pub mention: MentionGuardConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let mut services = HashMap::new();
        services.insert("openai".to_string(), ServiceLimits::openai());
        services.insert("zapier".to_string(), ServiceLimits::zapier());
        Self {
            default_limits: ServiceLimits::default(),
            services,
            stream: StreamLimits::general(),
            automation_stream: StreamLimits::automation(),
            mention: MentionGuardConfig::default(),
        }
    }
}

impl AdmissionConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Defaults, then `AI_GATE_CONFIG_PATH` if set, then env overrides.
    ///
    /// Never fails: unreadable files and bad values are logged and skipped.
    pub fn load() -> Self {
        let mut config = match std::env::var(format!("{}_CONFIG_PATH", ENV_PREFIX)) {
            Ok(path) => match Self::from_path(&path) {
                Ok(c) => {
                    info!(path = path.as_str(), "loaded admission config");
                    c
                }
                Err(e) => {
                    warn!(path = path.as_str(), error = %e, "ignoring unreadable admission config");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Defaults plus process environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        apply_limits(&lookup, "DEFAULT", &mut self.default_limits);

        let mut names: Vec<String> = self.services.keys().cloned().collect();
        if let Some(extra) = lookup(&format!("{}_SERVICES", ENV_PREFIX)) {
            for name in extra.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        for name in names {
            let default_limits = self.default_limits.clone();
            let limits = self.services.entry(name.clone()).or_insert(default_limits);
            apply_limits(&lookup, &env_segment(&name), limits);
        }

        apply_stream(&lookup, "STREAM", &mut self.stream);
        apply_stream(&lookup, "AUTOMATION_STREAM", &mut self.automation_stream);

        if let Some(t) = parse_var(&lookup, &format!("{}_MENTION_FLOOD_THRESHOLD", ENV_PREFIX)) {
            self.mention.threshold = t;
        }
        if let Some(id) = lookup(&format!("{}_BOT_USER_ID", ENV_PREFIX)) {
            if !id.trim().is_empty() {
                self.mention.bot_user_id = Some(id.trim().to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.default_limits.validate()?;
        for (name, limits) in &self.services {
            limits.validate().map_err(|e| {
                e.with_context(
                    ErrorContext::new()
                        .with_field_path(format!("services.{}", name))
                        .with_source("config"),
                )
            })?;
        }
        for (field, limits) in [("stream", &self.stream), ("automation_stream", &self.automation_stream)] {
            if !(0.0..=1.0).contains(&limits.repetition_threshold) {
                return Err(Error::configuration_with_context(
                    "repetition_threshold must be within 0.0..=1.0",
                    ErrorContext::new()
                        .with_field_path(format!("{}.repetition_threshold", field))
                        .with_source("config"),
                ));
            }
        }
        Ok(())
    }
}

/// `"my-service"` → `"MY_SERVICE"`.
fn env_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = raw.as_str(), "ignoring unparsable config value");
            None
        }
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = raw.as_str(), "ignoring unparsable config flag");
            None
        }
    }
}

fn apply_limits<F>(lookup: &F, segment: &str, limits: &mut ServiceLimits)
where
    F: Fn(&str) -> Option<String>,
{
    let key = |suffix: &str| format!("{}_{}_{}", ENV_PREFIX, segment, suffix);

    let mut candidate = limits.clone();
    if let Some(n) = parse_var::<_, usize>(lookup, &key("MAX_CONCURRENT")) {
        candidate.max_concurrent = n;
    }
    if let Some(n) = parse_var(lookup, &key("RPM")) {
        candidate.per_minute_cap = n;
    }
    if let Some(n) = parse_var(lookup, &key("RPH")) {
        candidate.per_hour_cap = n;
    }
    if let Some(n) = parse_var(lookup, &key("RETRY_ATTEMPTS")) {
        candidate.retry_attempts = n;
    }
    if let Some(ms) = parse_var(lookup, &key("BACKOFF_MIN_MS")) {
        candidate.backoff_min = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_var(lookup, &key("BACKOFF_MAX_MS")) {
        candidate.backoff_max = Duration::from_millis(ms);
    }
    if let Some(j) = parse_flag(lookup, &key("JITTER")) {
        candidate.jitter = j;
    }

    match candidate.validate() {
        Ok(()) => *limits = candidate,
        Err(e) => warn!(segment, error = %e, "ignoring invalid limit overrides"),
    }
}

fn apply_stream<F>(lookup: &F, segment: &str, limits: &mut StreamLimits)
where
    F: Fn(&str) -> Option<String>,
{
    let key = |suffix: &str| format!("{}_{}_{}", ENV_PREFIX, segment, suffix);

    if let Some(ms) = parse_var(lookup, &key("MAX_DURATION_MS")) {
        limits.max_duration = Duration::from_millis(ms);
    }
    if let Some(n) = parse_var(lookup, &key("MAX_EVENTS")) {
        limits.max_events = n;
    }
    if let Some(n) = parse_var(lookup, &key("MAX_CHARS")) {
        limits.max_chars = n;
    }
    if let Some(t) = parse_var::<_, f64>(lookup, &key("REPETITION_THRESHOLD")) {
        if (0.0..=1.0).contains(&t) {
            limits.repetition_threshold = t;
        } else {
            warn!(segment, threshold = t, "ignoring out-of-range repetition threshold");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_known_services() {
        let config = AdmissionConfig::default();
        assert_eq!(config.services["openai"].max_concurrent, 8);
        assert_eq!(config.services["zapier"].per_hour_cap, 75);
        assert_eq!(config.stream.max_duration, Duration::from_secs(120));
        assert_eq!(config.automation_stream.max_events, 500);
        assert_eq!(config.mention.threshold, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_service_and_adds_new_ones() {
        let mut config = AdmissionConfig::default();
        config.apply_env_from(lookup_from(&[
            ("AI_GATE_OPENAI_MAX_CONCURRENT", "2"),
            ("AI_GATE_SERVICES", "search-api, zapier"),
            ("AI_GATE_SEARCH_API_RPM", "10"),
            ("AI_GATE_SEARCH_API_BACKOFF_MIN_MS", "10"),
            ("AI_GATE_SEARCH_API_BACKOFF_MAX_MS", "40"),
            ("AI_GATE_MENTION_FLOOD_THRESHOLD", "5"),
            ("AI_GATE_BOT_USER_ID", "U123"),
        ]));

        assert_eq!(config.services["openai"].max_concurrent, 2);
        let search = &config.services["search-api"];
        assert_eq!(search.per_minute_cap, 10);
        assert_eq!(search.backoff_min, Duration::from_millis(10));
        assert_eq!(search.max_concurrent, ServiceLimits::default().max_concurrent);
        assert_eq!(config.mention.threshold, 5);
        assert_eq!(config.mention.bot_user_id.as_deref(), Some("U123"));
    }

    #[test]
    fn test_bad_values_are_ignored() {
        let mut config = AdmissionConfig::default();
        config.apply_env_from(lookup_from(&[
            ("AI_GATE_OPENAI_RPM", "lots"),
            ("AI_GATE_ZAPIER_BACKOFF_MIN_MS", "999999"),
            ("AI_GATE_STREAM_REPETITION_THRESHOLD", "7"),
            ("AI_GATE_STREAM_MAX_EVENTS", "250"),
            ("AI_GATE_DEFAULT_MAX_CONCURRENT", "0"),
        ]));

        assert_eq!(config.services["openai"].per_minute_cap, 500);
        // min above max would be invalid, so the whole override set is dropped
        assert_eq!(config.services["zapier"].backoff_min, Duration::from_secs(2));
        assert_eq!(config.stream.repetition_threshold, StreamLimits::general().repetition_threshold);
        assert_eq!(config.stream.max_events, 250);
        assert_eq!(config.default_limits.max_concurrent, ServiceLimits::default().max_concurrent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip_of_partial_file() {
        let yaml = r#"
default_limits:
  max_concurrent: 4
services:
  x:
    max_concurrent: 2
    retry_attempts: 2
    backoff_min_ms: 10
    backoff_max_ms: 40
stream:
  max_chars: 4000
mention:
  threshold: 2
"#;
        let config = AdmissionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.default_limits.max_concurrent, 4);
        assert_eq!(config.services["x"].retry_attempts, 2);
        // services map replaced wholesale by the file
        assert!(!config.services.contains_key("openai"));
        assert_eq!(config.stream.max_chars, 4000);
        assert_eq!(config.stream.max_events, StreamLimits::general().max_events);
        assert_eq!(config.mention.threshold, 2);
    }

    #[test]
    fn test_yaml_rejects_invalid_limits() {
        let yaml = "services:\n  x:\n    backoff_min_ms: 50\n    backoff_max_ms: 10\n";
        let err = AdmissionConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("services.x"));
    }

    #[test]
    fn test_env_segment() {
        assert_eq!(env_segment("search-api"), "SEARCH_API");
        assert_eq!(env_segment("openai"), "OPENAI");
    }
}
