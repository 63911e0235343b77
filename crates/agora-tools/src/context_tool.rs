//! The `get_context_status` tool: the caller's own context usage.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use agora_core::conversation::ConversationManager;
use agora_core::tools::registry::{Tool, ToolContext, ToolError};

/// Report the caller's conversation-context usage.
pub struct ContextStatusTool {
    conversations: Arc<ConversationManager>,
}

impl ContextStatusTool {
    /// Create the tool over the conversation store.
    pub fn new(conversations: Arc<ConversationManager>) -> Self {
        Self { conversations }
    }
}

#[async_trait]
impl Tool for ContextStatusTool {
    fn name(&self) -> &str {
        "get_context_status"
    }

    fn description(&self) -> &str {
        "Check how full your conversation context is. Use to decide when to summarise and wrap up."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        let status = self.conversations.status(&ctx.agent_id);
        Ok(json!({
            "estimatedTokens": status.estimated_tokens,
            "limit": status.limit,
            "ratio": status.ratio,
        }))
    }
}
