use crate::error_code::StandardErrorCode;
use crate::{Error, ErrorContext, Result};
use reqwest::header::HeaderMap;
use reqwest::Response;
use std::env;
use std::time::Duration;
use tracing::info;

const MAX_BODY_IN_MESSAGE: usize = 512;

/// HTTP client with env-overridable timeout and pool settings.
///
/// `AI_GATE_HTTP_TIMEOUT_SECS` (default 30), `AI_GATE_HTTP_POOL_MAX_IDLE_PER_HOST` (default 32).
pub fn build_client() -> Result<reqwest::Client> {
    let timeout_secs = env::var("AI_GATE_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(30);
    let max_idle = env::var("AI_GATE_HTTP_POOL_MAX_IDLE_PER_HOST")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(32);

    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(max_idle)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .build()
        .map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("transport"),
            )
        })
}

/// Pass successful responses through; turn anything else into a classified
/// [`Error`] so the governor knows whether to retry.
///
/// A provider error code in the body (`{"error": {"code": ...}}` or
/// `{"error": {"type": ...}}`) takes precedence over the HTTP status.
/// `Retry-After: <seconds>` is attached to transient errors.
pub async fn check_response(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let status = status.as_u16();
    let retry_after = retry_after(resp.headers());
    let url_path = resp.url().path().to_string();
    let body = resp.text().await.unwrap_or_default();

    let code = error_code_from_body(&body)
        .as_deref()
        .and_then(StandardErrorCode::from_provider_code)
        .unwrap_or_else(|| StandardErrorCode::from_http_status(status));

    info!(
        http_status = status,
        standard_code = code.code(),
        path = url_path.as_str(),
        "upstream request failed"
    );

    let mut err = Error::upstream(code, format!("HTTP {}: {}", status, truncate(&body)))
        .with_context(
            ErrorContext::new()
                .with_details(format!("http_status: {}", status))
                .with_source("transport"),
        );
    if let Some(after) = retry_after {
        err = err.with_retry_after(after);
    }
    Err(err)
}

/// Only the `Retry-After: <seconds>` form is supported.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: u64 = raw.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

fn error_code_from_body(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    error
        .get("code")
        .and_then(|v| v.as_str())
        .or_else(|| error.get("type").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_IN_MESSAGE) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
