use crate::error_code::StandardErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "services.openai.backoff_min_ms")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "governor", "conversation_gate")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the admission layer.
///
/// Upstream failures are split into two classes: [`Error::Transient`] is
/// retried by the governor, [`Error::Permanent`] is surfaced immediately.
/// [`Error::Cancelled`] is caller-initiated and never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transient upstream error ({code}): {message}{}", format_context(.context))]
    Transient {
        code: StandardErrorCode,
        message: String,
        retry_after: Option<Duration>,
        context: ErrorContext,
    },

    #[error("Permanent request error ({code}): {message}{}", format_context(.context))]
    Permanent {
        code: StandardErrorCode,
        message: String,
        context: ErrorContext,
    },

    #[error("Operation cancelled{}", format_context(.context))]
    Cancelled { context: ErrorContext },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// A retryable upstream failure.
    pub fn transient(code: StandardErrorCode, msg: impl Into<String>) -> Self {
        Error::Transient {
            code,
            message: msg.into(),
            retry_after: None,
            context: ErrorContext::new(),
        }
    }

    /// A failure rooted in the request itself; retrying cannot help.
    pub fn permanent(code: StandardErrorCode, msg: impl Into<String>) -> Self {
        Error::Permanent {
            code,
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Classify an upstream failure by its code: retryable codes become
    /// [`Error::Transient`], everything else [`Error::Permanent`].
    pub fn upstream(code: StandardErrorCode, msg: impl Into<String>) -> Self {
        if code == StandardErrorCode::Cancelled {
            return Error::cancelled("upstream");
        }
        if code.retryable() {
            Self::transient(code, msg)
        } else {
            Self::permanent(code, msg)
        }
    }

    /// Classify a non-success HTTP status returned by an upstream service.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let code = StandardErrorCode::from_http_status(status);
        Self::upstream(code, format!("HTTP {}: {}", status, body.into()))
            .with_context(ErrorContext::new().with_details(format!("http_status: {}", status)))
    }

    pub fn cancelled(source: impl Into<String>) -> Self {
        Error::Cancelled {
            context: ErrorContext::new().with_source(source),
        }
    }

    /// Create a new runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::runtime_with_context(msg, ErrorContext::new())
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Attach an upstream `Retry-After` hint. No-op for non-transient errors.
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        if let Error::Transient { retry_after, .. } = &mut self {
            *retry_after = Some(after);
        }
        self
    }

    /// Replace the structured context, if this variant carries one.
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        match &mut self {
            Error::Transient { context, .. }
            | Error::Permanent { context, .. }
            | Error::Cancelled { context }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => *context = ctx,
            _ => {}
        }
        self
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Transient { context, .. }
            | Error::Permanent { context, .. }
            | Error::Cancelled { context }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The standard code behind this error.
    pub fn code(&self) -> StandardErrorCode {
        match self {
            Error::Transient { code, .. } | Error::Permanent { code, .. } => *code,
            Error::Cancelled { .. } => StandardErrorCode::Cancelled,
            Error::Configuration { .. } => StandardErrorCode::InvalidRequest,
            _ => StandardErrorCode::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Fixed text a chat front-end can show for this failure.
    pub fn user_message(&self) -> &'static str {
        self.code().user_message()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        let ctx = ErrorContext::new().with_source("transport");
        let err = if e.is_timeout() {
            Error::transient(StandardErrorCode::Timeout, message)
        } else if let Some(status) = e.status() {
            Error::from_http_status(status.as_u16(), message)
        } else if e.is_connect() || e.is_request() || e.is_body() {
            Error::transient(StandardErrorCode::Network, message)
        } else if e.is_decode() {
            Error::transient(StandardErrorCode::ServerError, message)
        } else if e.is_builder() {
            Error::permanent(StandardErrorCode::InvalidRequest, message)
        } else {
            Error::permanent(StandardErrorCode::Unknown, message)
        };
        err.with_context(ctx)
    }
}
