//! [`LlmClient`]: the single entry point for chat-completion calls.
//!
//! Responsibilities layered on top of the raw [`Provider`]s:
//!
//! * **Service registry** -- resolves a service id to its provider and
//!   model configuration.
//! * **Global concurrency cap** -- a FIFO semaphore bounds in-flight
//!   HTTP calls across every agent; excess callers queue.
//! * **Retry state machine** -- transient failures back off and retry
//!   (bounded attempts); retry and final-failure events are published.
//! * **Cancellation** -- every call takes a [`CancellationToken`]; an
//!   abort interrupts the in-flight request or backoff sleep promptly
//!   and surfaces as [`ProviderError::Aborted`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use agora_types::ServiceConfig;

use crate::error::{ProviderError, Result};
use crate::openai_compat::OpenAiCompatProvider;
use crate::provider::Provider;
use crate::retry::{delay_for, is_retryable, LlmEvent, RetryConfig};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, Usage};

/// One chat call as issued by the conversation loop.
#[derive(Debug, Clone)]
pub struct LlmCallRequest {
    /// Service to call. `None` selects the default (first configured).
    pub service_id: Option<String>,
    /// Full message list, system prompt first.
    pub messages: Vec<ChatMessage>,
    /// Tool definitions in OpenAI function format.
    pub tools: Vec<serde_json::Value>,
    /// Tool-choice directive, if any.
    pub tool_choice: Option<serde_json::Value>,
}

/// The distilled result of a successful chat call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The assistant message (content and/or tool calls).
    pub message: ChatMessage,
    /// Token usage, when the provider reports it.
    pub usage: Option<Usage>,
    /// Finish reason ("stop", "tool_calls", "length", ...).
    pub finish_reason: Option<String>,
}

/// Chat-completion caller with retry, a global concurrency cap, and
/// cancellable in-flight calls.
pub struct LlmClient {
    services: HashMap<String, ServiceConfig>,
    providers: HashMap<String, Arc<dyn Provider>>,
    default_service: Option<String>,
    semaphore: Arc<Semaphore>,
    retry: RetryConfig,
    events: Option<mpsc::UnboundedSender<LlmEvent>>,
}

impl LlmClient {
    /// Build a client from service configurations.
    ///
    /// Each service gets an [`OpenAiCompatProvider`]; the first service
    /// becomes the default. `concurrency` bounds in-flight calls
    /// globally (waiters are served FIFO).
    pub fn new(services: Vec<ServiceConfig>, concurrency: usize, retry: RetryConfig) -> Self {
        let default_service = services.first().map(|s| s.id.clone());
        let mut service_map = HashMap::new();
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for service in services {
            providers.insert(
                service.id.clone(),
                Arc::new(OpenAiCompatProvider::new(service.clone())),
            );
            service_map.insert(service.id.clone(), service);
        }
        Self {
            services: service_map,
            providers,
            default_service,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            retry,
            events: None,
        }
    }

    /// Replace the provider for a service (fake providers in tests,
    /// pre-authenticated providers in bins).
    pub fn with_provider(mut self, service_id: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        let service_id = service_id.into();
        if self.default_service.is_none() {
            self.default_service = Some(service_id.clone());
        }
        self.services
            .entry(service_id.clone())
            .or_insert_with(|| ServiceConfig::new(service_id.clone(), "", "fake-model"));
        self.providers.insert(service_id, provider);
        self
    }

    /// Attach an event sink for retry/failure events.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<LlmEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The configured service map.
    pub fn service(&self, id: &str) -> Option<&ServiceConfig> {
        self.services.get(id)
    }

    /// The default service (first configured), if any.
    pub fn default_service(&self) -> Option<&ServiceConfig> {
        self.default_service
            .as_deref()
            .and_then(|id| self.services.get(id))
    }

    /// Resolve a requested service id to (config, provider).
    fn resolve(&self, id: Option<&str>) -> Result<(&ServiceConfig, &Arc<dyn Provider>)> {
        let id = id
            .or(self.default_service.as_deref())
            .ok_or_else(|| ProviderError::NotConfigured("no services configured".into()))?;
        let service = self
            .services
            .get(id)
            .ok_or_else(|| ProviderError::NotConfigured(format!("unknown service '{id}'")))?;
        let provider = self
            .providers
            .get(id)
            .ok_or_else(|| ProviderError::NotConfigured(format!("no provider for '{id}'")))?;
        Ok((service, provider))
    }

    fn emit(&self, event: LlmEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Execute one chat call under the global cap.
    ///
    /// Blocks (asynchronously) while the concurrency semaphore is
    /// exhausted. Retries transient failures with exponential backoff;
    /// `cancel` interrupts the queue wait, the HTTP request, and any
    /// backoff sleep.
    pub async fn chat(
        &self,
        call: LlmCallRequest,
        cancel: CancellationToken,
    ) -> Result<ChatOutcome> {
        let (service, provider) = self.resolve(call.service_id.as_deref())?;

        let request = ChatRequest {
            model: service.model.clone(),
            messages: call.messages,
            max_tokens: service.max_tokens,
            temperature: None,
            tools: call.tools,
            tool_choice: call.tool_choice,
        };

        // FIFO wait for a slot; abort promptly if cancelled while queued.
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.emit(LlmEvent::CallAborted { service: service.id.clone() });
                return Err(ProviderError::Aborted);
            }
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| ProviderError::NotConfigured("llm semaphore closed".into()))?
            }
        };

        let mut attempt: u32 = 0;
        loop {
            debug!(service = %service.id, attempt, "llm attempt");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.emit(LlmEvent::CallAborted { service: service.id.clone() });
                    return Err(ProviderError::Aborted);
                }
                result = tokio::time::timeout(
                    self.retry.attempt_timeout,
                    provider.complete(&request),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ProviderError::Timeout),
                },
            };

            match result {
                Ok(response) => {
                    if attempt > 0 {
                        debug!(service = %service.id, attempt, "llm call succeeded after retry");
                    }
                    return Ok(distill(response)?);
                }
                Err(err) => {
                    if !is_retryable(&err) || attempt >= self.retry.max_retries {
                        warn!(service = %service.id, attempt, error = %err, "llm call failed");
                        self.emit(LlmEvent::CallFailed {
                            service: service.id.clone(),
                            code: err.code(),
                            error: err.to_string(),
                        });
                        return Err(err);
                    }

                    let delay = delay_for(&self.retry, attempt, &err);
                    warn!(
                        service = %service.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    self.emit(LlmEvent::RetryScheduled {
                        service: service.id.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: err.to_string(),
                    });

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            self.emit(LlmEvent::CallAborted { service: service.id.clone() });
                            return Err(ProviderError::Aborted);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Reduce a raw response to the first choice's message and metadata.
fn distill(mut response: ChatResponse) -> Result<ChatOutcome> {
    if response.choices.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "response contained no choices".into(),
        ));
    }
    let choice = response.choices.remove(0);
    Ok(ChatOutcome {
        message: choice.message,
        usage: response.usage,
        finish_reason: choice.finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Choice;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Provider that fails `failures` times then succeeds.
    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
    }

    impl FlakyProvider {
        fn new(failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
            }
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ProviderError::RequestFailed("HTTP 503: busy".into()))
            } else {
                Ok(ChatResponse {
                    id: "r1".into(),
                    choices: vec![Choice {
                        index: 0,
                        message: ChatMessage::assistant("ok"),
                        finish_reason: Some("stop".into()),
                    }],
                    usage: None,
                    model: "fake-model".into(),
                })
            }
        }
    }

    /// Provider that never returns until cancelled.
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hang"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter_fraction: 0.0,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn call() -> LlmCallRequest {
        LlmCallRequest {
            service_id: None,
            messages: vec![ChatMessage::user("hi")],
            tools: vec![],
            tool_choice: None,
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let client = LlmClient::new(vec![], 2, fast_retry())
            .with_provider("svc", Arc::new(FlakyProvider::new(2)));
        let outcome = client.chat(call(), CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.message.content.as_text(), "ok");
        assert_eq!(outcome.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn exhausted_retries_fail() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = LlmClient::new(vec![], 2, fast_retry())
            .with_provider("svc", Arc::new(FlakyProvider::new(10)))
            .with_events(tx);
        let err = client
            .chat(call(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed(_)));

        // 3 retry events then a final failure.
        let mut retries = 0;
        let mut failed = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                LlmEvent::RetryScheduled { .. } => retries += 1,
                LlmEvent::CallFailed { code, .. } => {
                    failed += 1;
                    assert_eq!(code, "api_error");
                }
                LlmEvent::CallAborted { .. } => panic!("not aborted"),
            }
        }
        assert_eq!(retries, 3);
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn abort_interrupts_in_flight_call() {
        let client = LlmClient::new(vec![], 2, fast_retry())
            .with_provider("svc", Arc::new(HangingProvider));
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel2.cancel();
        });
        let err = client.chat(call(), cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Aborted));
    }

    #[tokio::test]
    async fn concurrency_cap_queues_excess_calls() {
        // Cap of 1: the second call must wait for the first to finish.
        struct SlowProvider;

        #[async_trait]
        impl Provider for SlowProvider {
            fn name(&self) -> &str {
                "slow"
            }

            async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(ChatResponse {
                    id: "r".into(),
                    choices: vec![Choice {
                        index: 0,
                        message: ChatMessage::assistant("done"),
                        finish_reason: Some("stop".into()),
                    }],
                    usage: None,
                    model: "fake-model".into(),
                })
            }
        }

        let client = Arc::new(
            LlmClient::new(vec![], 1, fast_retry()).with_provider("svc", Arc::new(SlowProvider)),
        );

        let start = tokio::time::Instant::now();
        let a = {
            let client = client.clone();
            tokio::spawn(async move { client.chat(call(), CancellationToken::new()).await })
        };
        let b = {
            let client = client.clone();
            tokio::spawn(async move { client.chat(call(), CancellationToken::new()).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        // Two 50ms calls through a cap of 1 cannot finish in under 100ms.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn unknown_service_is_not_configured() {
        let client = LlmClient::new(vec![], 1, fast_retry())
            .with_provider("svc", Arc::new(FlakyProvider::new(0)));
        let mut bad_call = call();
        bad_call.service_id = Some("nope".into());
        let err = client
            .chat(bad_call, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
