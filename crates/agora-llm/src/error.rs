//! Error types for LLM provider calls.

use thiserror::Error;

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failures from a chat-completion call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider is throttling requests (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait in milliseconds before retrying.
        retry_after_ms: u64,
    },

    /// The per-attempt timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure (connection refused, TLS, DNS, ...).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint returned a non-success status not covered elsewhere.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication or authorization was rejected (401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested model is unknown to the endpoint (404).
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The request exceeded the model's context window.
    #[error("context length exceeded: {0}")]
    ContextLengthExceeded(String),

    /// The service is missing required configuration (no API key, no
    /// such service id).
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The response body did not parse as a chat completion.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization error while building the request.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The call was aborted via its cancellation token.
    #[error("call aborted")]
    Aborted,
}

impl ProviderError {
    /// Stable error code for surfacing in tool results and events.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Http(_) | ProviderError::Timeout => "network_error",
            ProviderError::RateLimited { .. }
            | ProviderError::RequestFailed(_)
            | ProviderError::AuthFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::InvalidResponse(_) => "api_error",
            ProviderError::ContextLengthExceeded(_) => "context_limit_exceeded",
            ProviderError::Aborted => "llm_call_aborted",
            ProviderError::NotConfigured(_) | ProviderError::Json(_) => "llm_call_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ProviderError::Timeout.code(), "network_error");
        assert_eq!(
            ProviderError::RateLimited { retry_after_ms: 10 }.code(),
            "api_error"
        );
        assert_eq!(ProviderError::Aborted.code(), "llm_call_aborted");
        assert_eq!(
            ProviderError::ContextLengthExceeded("8k".into()).code(),
            "context_limit_exceeded"
        );
        assert_eq!(
            ProviderError::NotConfigured("no key".into()).code(),
            "llm_call_failed"
        );
    }

    #[test]
    fn display_formats() {
        let err = ProviderError::RateLimited { retry_after_ms: 500 };
        assert_eq!(err.to_string(), "rate limited: retry after 500ms");
        assert_eq!(ProviderError::Aborted.to_string(), "call aborted");
    }
}
