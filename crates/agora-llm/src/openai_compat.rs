//! OpenAI-compatible provider implementation.
//!
//! [`OpenAiCompatProvider`] works with any API that follows the OpenAI
//! chat completion format. The endpoint is selected by the
//! [`ServiceConfig`] it is built from; the API key is resolved from the
//! configured environment variable, or injected explicitly for tests.

use async_trait::async_trait;
use tracing::{debug, warn};

use agora_types::ServiceConfig;

use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::types::{ChatRequest, ChatResponse};

/// A provider that speaks the OpenAI chat-completions wire format.
pub struct OpenAiCompatProvider {
    service: ServiceConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create a provider from a service configuration.
    ///
    /// The API key is resolved from `service.api_key_env` at request time.
    pub fn new(service: ServiceConfig) -> Self {
        Self {
            service,
            http: reqwest::Client::new(),
            api_key: None,
        }
    }

    /// Create a provider with an explicit API key, bypassing the
    /// environment lookup.
    pub fn with_api_key(service: ServiceConfig, api_key: String) -> Self {
        Self {
            service,
            http: reqwest::Client::new(),
            api_key: Some(api_key),
        }
    }

    /// The service configuration this provider was built from.
    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    fn completions_url(&self) -> String {
        let base = self.service.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.service.api_key_env).map_err(|_| {
            ProviderError::NotConfigured(format!("set {} env var", self.service.api_key_env))
        })
    }
}

/// Parse a Retry-After header value (seconds) into milliseconds.
fn parse_retry_after_header(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

/// Best-effort extraction of `error.message` from a JSON error body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
}

/// Whether a 400 body indicates the request blew the context window.
fn is_context_length_error(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("context_length") || lower.contains("context length")
        || lower.contains("maximum context")
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.service.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            service = %self.service.id,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let mut req = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");

        for (k, v) in &self.service.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_ms = parse_retry_after_header(&response).unwrap_or(1000);
                warn!(
                    service = %self.service.id,
                    retry_after_ms = retry_ms,
                    "rate limited"
                );
                return Err(ProviderError::RateLimited {
                    retry_after_ms: retry_ms,
                });
            }

            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ProviderError::AuthFailed(
                    extract_error_message(&body).unwrap_or(body),
                ));
            }

            if status.as_u16() == 404 {
                return Err(ProviderError::ModelNotFound(format!(
                    "model '{}': {}",
                    request.model, body
                )));
            }

            if status.as_u16() == 400 && is_context_length_error(&body) {
                return Err(ProviderError::ContextLengthExceeded(
                    extract_error_message(&body).unwrap_or(body),
                ));
            }

            return Err(ProviderError::RequestFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to parse response: {e}"))
        })?;

        if chat_response.choices.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "response contained no choices".into(),
            ));
        }

        debug!(
            service = %self.service.id,
            model = %chat_response.model,
            "chat completion response received"
        );

        Ok(chat_response)
    }
}
