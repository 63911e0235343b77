//! The [`Provider`] trait: one chat-completion backend.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse};

/// A chat-completion backend.
///
/// Implementations are stateless with respect to conversations: the full
/// message list is supplied on every call. The [`LlmClient`](crate::client::LlmClient)
/// layers concurrency capping, retry, and cancellation on top; providers
/// only perform a single attempt.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name (used in logs and events).
    fn name(&self) -> &str;

    /// Execute one chat completion attempt.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}
