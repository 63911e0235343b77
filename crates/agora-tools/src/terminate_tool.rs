//! The `terminate_agent` tool: cascade-terminate a descendant.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use agora_core::agents::AgentManager;
use agora_core::org::OrgStore;
use agora_core::tools::registry::{optional_str, required_str, Tool, ToolContext, ToolError};

/// Terminate a descendant agent and its whole subtree.
pub struct TerminateAgentTool {
    org: Arc<OrgStore>,
    agents: Arc<AgentManager>,
}

impl TerminateAgentTool {
    /// Wire the tool from its collaborators.
    pub fn new(org: Arc<OrgStore>, agents: Arc<AgentManager>) -> Self {
        Self { org, agents }
    }
}

#[async_trait]
impl Tool for TerminateAgentTool {
    fn name(&self) -> &str {
        "terminate_agent"
    }

    fn description(&self) -> &str {
        "Terminate one of your descendant agents (and its whole subtree). Pending work is discarded."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agentId": { "type": "string", "description": "Id of the agent to terminate" },
                "reason": { "type": "string", "description": "Why the agent is being terminated" }
            },
            "required": ["agentId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let target = required_str(&args, "agentId")?;
        let reason = optional_str(&args, "reason");

        // Only ancestors may terminate.
        if !self.org.is_descendant(&ctx.agent_id, &target) {
            return Err(ToolError::NotChildAgent(target));
        }

        let terminated = self
            .agents
            .terminate(&target, reason.as_deref())
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        info!(
            caller = %ctx.agent_id,
            target = %target,
            count = terminated.len(),
            "terminate cascade completed"
        );
        Ok(json!({
            "terminated": terminated,
            "count": terminated.len(),
        }))
    }
}
