//! Error types for the model gateway.

use thiserror::Error;

/// Additional context from backend errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the backend.
    pub http_status: Option<u16>,
    /// Backend-reported error text (Ollama returns `{"error": "..."}`).
    pub backend_message: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.backend_message = Some(message.into());
        self
    }
}

/// Errors that can occur when calling the model backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid request - permanent error, don't retry.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Backend returned an error status - may be retryable.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    /// Backend answered, but the envelope could not be read (bad JSON, no message).
    #[error("malformed response from {provider}: {message}")]
    MalformedResponse {
        provider: &'static str,
        message: String,
    },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (bad base URL, client construction, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: None,
        }
    }

    /// Create a provider error with context.
    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    /// Create a malformed response error.
    pub fn malformed(provider: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the gateway itself may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidRequest { .. } => false,
            Self::MalformedResponse { .. } => false,
            Self::Config(_) => false,
        }
    }

    /// Whether the backend should be considered unusable for this evaluation.
    ///
    /// Only a malformed-but-delivered response counts as an ordinary failed
    /// attempt; every other error means another prompt will not help.
    pub fn is_backend_unavailable(&self) -> bool {
        !matches!(self, Self::MalformedResponse { .. })
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Provider { .. } => "provider_error",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Provider { context, .. } => context.as_ref(),
            _ => None,
        }
    }
}
