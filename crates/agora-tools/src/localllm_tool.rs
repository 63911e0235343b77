//! The `localllm_chat` tool: optional local inference path.
//!
//! When no local provider is configured (or the headless flag disabled
//! it), the tool answers with the stable `localllm_not_ready` code so
//! agents can fall back to their primary service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agora_core::tools::registry::{Tool, ToolContext, ToolError};
use agora_llm::provider::Provider;
use agora_llm::types::{ChatMessage, ChatRequest};

/// Chat with a locally hosted model, when one is available.
pub struct LocalLlmChatTool {
    provider: Option<Arc<dyn Provider>>,
}

impl LocalLlmChatTool {
    /// Create the tool; `provider = None` reports not-ready.
    pub fn new(provider: Option<Arc<dyn Provider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for LocalLlmChatTool {
    fn name(&self) -> &str {
        "localllm_chat"
    }

    fn description(&self) -> &str {
        "Chat with the locally hosted model, if one is running. Cheaper but less capable."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messages": {
                    "type": "array",
                    "description": "Chat messages ({role, content})",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["role", "content"]
                    }
                }
            },
            "required": ["messages"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let provider = self.provider.as_ref().ok_or(ToolError::LocalLlmNotReady)?;

        let raw = args
            .get("messages")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                ToolError::MissingParameter("missing required field: messages".into())
            })?;
        if raw.is_empty() {
            return Err(ToolError::MissingParameter(
                "messages must not be empty".into(),
            ));
        }

        let mut messages = Vec::with_capacity(raw.len());
        for entry in raw {
            let role = entry.get("role").and_then(|v| v.as_str()).ok_or_else(|| {
                ToolError::MissingParameter("each message needs a string role".into())
            })?;
            let content = entry.get("content").and_then(|v| v.as_str()).ok_or_else(|| {
                ToolError::MissingParameter("each message needs string content".into())
            })?;
            messages.push(ChatMessage::new(role, content));
        }

        debug!(agent = %ctx.agent_id, messages = messages.len(), "local llm chat");
        let request = ChatRequest::new("local", messages);
        let response = provider
            .complete(&request)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("local llm failed: {e}")))?;

        let message = &response
            .choices
            .first()
            .ok_or_else(|| ToolError::ExecutionFailed("local llm returned no choices".into()))?
            .message;
        Ok(json!({
            "message": {
                "role": message.role,
                "content": message.content.as_text(),
            }
        }))
    }
}
