//! Standard upstream error codes and their retry semantics.
//!
//! Every failure coming back from an upstream service is folded into one of
//! these codes. The governor only looks at [`StandardErrorCode::retryable`]
//! to decide between retrying and failing fast; the chat layer uses
//! [`StandardErrorCode::user_message`] to render a fixed reply.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category    | Description                    |
//! |--------|-------------|--------------------------------|
//! | E1xxx  | client      | Request-side errors            |
//! | E2xxx  | rate        | Rate limit and quota errors    |
//! | E3xxx  | server      | Provider-side errors           |
//! | E4xxx  | operational | Lifecycle and state conflicts  |
//! | E9xxx  | unknown     | Catch-all / unclassified       |
//!
//! ## Example
//!
//! ```rust
//! use ai_gate_rust::error_code::StandardErrorCode;
//!
//! let code = StandardErrorCode::from_http_status(429);
//! assert_eq!(code.code(), "E2001");
//! assert!(code.retryable());
//! assert_eq!(code.category(), "rate");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical upstream error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardErrorCode {
    /// E1001: Malformed request, invalid parameters, or missing required fields
    InvalidRequest,
    /// E1002: Invalid, expired, or missing API key
    Authentication,
    /// E1003: Valid credentials but insufficient permissions
    PermissionDenied,
    /// E1004: Requested model, endpoint, or resource does not exist
    NotFound,
    /// E1005: Input exceeds context window or API payload size limit
    RequestTooLarge,
    /// E2001: Request rate limit exceeded
    RateLimited,
    /// E2002: Account usage quota or billing limit reached
    QuotaExhausted,
    /// E3001: Internal server error on provider side
    ServerError,
    /// E3002: Provider service temporarily overloaded
    Overloaded,
    /// E3003: Request timed out before response received
    Timeout,
    /// E3004: Connection could not be established or was reset
    Network,
    /// E4001: State conflict (e.g., concurrent modification)
    Conflict,
    /// E4002: Request was cancelled by the caller
    Cancelled,
    /// E9999: Error could not be classified
    Unknown,
}

impl StandardErrorCode {
    /// Returns the canonical code string (e.g., `"E1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::Authentication => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::RequestTooLarge => "E1005",
            Self::RateLimited => "E2001",
            Self::QuotaExhausted => "E2002",
            Self::ServerError => "E3001",
            Self::Overloaded => "E3002",
            Self::Timeout => "E3003",
            Self::Network => "E3004",
            Self::Conflict => "E4001",
            Self::Cancelled => "E4002",
            Self::Unknown => "E9999",
        }
    }

    /// Returns the standard name (e.g., `"invalid_request"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Returns whether a failure with this code is expected to clear on retry.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::ServerError
                | Self::Overloaded
                | Self::Timeout
                | Self::Network
                | Self::Conflict
        )
    }

    /// Returns the category: `"client"`, `"rate"`, `"server"`, `"operational"`, or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::RequestTooLarge => "client",
            Self::RateLimited | Self::QuotaExhausted => "rate",
            Self::ServerError | Self::Overloaded | Self::Timeout | Self::Network => "server",
            Self::Conflict | Self::Cancelled => "operational",
            Self::Unknown => "unknown",
        }
    }

    /// Fixed user-facing message for a final failure with this code.
    ///
    /// These never include upstream text, so rendering them costs no tokens
    /// and leaks nothing.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "Error: the upstream service timed out. If this persists, contact an administrator.",
            Self::RateLimited => "Error: request limit reached. If this persists, contact an administrator.",
            Self::QuotaExhausted => "Error: usage quota exhausted. If this persists, contact an administrator.",
            Self::Network => "Error: network problem reaching the upstream service. If this persists, contact an administrator.",
            Self::ServerError | Self::Overloaded => "Error: the upstream service is unavailable. If this persists, contact an administrator.",
            Self::RequestTooLarge => "Error: conversation too long. Please start a new thread.",
            Self::NotFound => "Error: model or resource unavailable. If this persists, contact an administrator.",
            Self::Authentication | Self::PermissionDenied => "Error: permission denied. If this persists, contact an administrator.",
            Self::Cancelled => "Error: the request was cancelled.",
            Self::InvalidRequest | Self::Conflict | Self::Unknown => "Error: unexpected failure. If this persists, contact an administrator.",
        }
    }

    /// Maps a provider error code/type string to the corresponding `StandardErrorCode`.
    ///
    /// Supports both standard names (e.g., `"invalid_request"`) and provider-specific
    /// aliases such as `"invalid_api_key"`, `"context_length_exceeded"`, `"overloaded_error"`.
    pub fn from_provider_code(provider_code: &str) -> Option<Self> {
        let code = match provider_code {
            "invalid_request" | "invalid_request_error" => Self::InvalidRequest,
            "authentication" | "invalid_api_key" | "authentication_error" => Self::Authentication,
            "permission_denied" | "permission_error" => Self::PermissionDenied,
            "not_found" | "model_not_found" => Self::NotFound,
            "request_too_large" | "context_length_exceeded" => Self::RequestTooLarge,
            "rate_limited" | "rate_limit_exceeded" => Self::RateLimited,
            "quota_exhausted" | "insufficient_quota" => Self::QuotaExhausted,
            "server_error" => Self::ServerError,
            "overloaded" | "overloaded_error" => Self::Overloaded,
            "timeout" => Self::Timeout,
            "network" | "connection_error" => Self::Network,
            "conflict" => Self::Conflict,
            "cancelled" => Self::Cancelled,
            _ => return None,
        };
        Some(code)
    }

    /// Maps an HTTP status code to the most likely `StandardErrorCode`.
    ///
    /// Any 5xx without a more specific mapping is a server error; unmapped
    /// 4xx statuses stay `Unknown` and are therefore not retried.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            503 | 529 => Self::Overloaded,
            504 => Self::Timeout,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
