//! LLM provider abstraction for agora.
//!
//! This crate owns everything that talks to a chat-completion endpoint:
//!
//! * [`types`] -- OpenAI-format request/response types, including
//!   multimodal content parts for vision/file routing.
//! * [`provider`] -- the [`Provider`](provider::Provider) trait.
//! * [`openai_compat`] -- the HTTP implementation for any
//!   OpenAI-compatible endpoint.
//! * [`retry`] -- backoff configuration, transient-error classification,
//!   and the retry event vocabulary.
//! * [`client`] -- [`LlmClient`](client::LlmClient): service registry,
//!   global concurrency cap, per-attempt timeout, cancellable calls, and
//!   the retry state machine.

pub mod client;
pub mod error;
pub mod openai_compat;
pub mod provider;
pub mod retry;
pub mod types;

pub use client::{ChatOutcome, LlmCallRequest, LlmClient};
pub use error::{ProviderError, Result};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::Provider;
pub use retry::{LlmEvent, RetryConfig};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, ContentPart, FunctionCall, MessageContent,
    ToolCall, Usage,
};
