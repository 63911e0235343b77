//! The `spawn_agent_with_task` tool: delegate work to a new child agent.
//!
//! Creates the agent under the caller, binds the task brief, allocates
//! a workspace when the caller is root, assigns a custom name with a
//! short best-effort LLM call (deterministic fallback), and delivers
//! the initial message to the child's inbox.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use agora_core::agents::{AgentManager, SpawnAgent};
use agora_core::bus::{MessageBus, SendMessage};
use agora_core::org::OrgStore;
use agora_core::tools::registry::{required_str, Tool, ToolContext, ToolError};
use agora_core::workspace::WorkspaceManager;
use agora_llm::client::{LlmCallRequest, LlmClient};
use agora_llm::types::ChatMessage;
use agora_types::message::MessageType;
use agora_types::{TaskBrief, ROOT_AGENT_ID};

/// Longest custom name the naming call may assign.
const MAX_NAME_LEN: usize = 24;

/// Spawn a child agent bound to a task brief.
pub struct SpawnAgentTool {
    org: Arc<OrgStore>,
    agents: Arc<AgentManager>,
    bus: Arc<MessageBus>,
    workspaces: Arc<WorkspaceManager>,
    llm: Arc<LlmClient>,
}

impl SpawnAgentTool {
    /// Wire the tool from its collaborators.
    pub fn new(
        org: Arc<OrgStore>,
        agents: Arc<AgentManager>,
        bus: Arc<MessageBus>,
        workspaces: Arc<WorkspaceManager>,
        llm: Arc<LlmClient>,
    ) -> Self {
        Self {
            org,
            agents,
            bus,
            workspaces,
            llm,
        }
    }

    /// Ask the naming model for a short agent name; fall back to a
    /// deterministic `<role>-<n>` on any failure.
    async fn pick_name(&self, role_name: &str, objective: &str, sibling_count: usize) -> String {
        let fallback = format!("{role_name}-{}", sibling_count + 1);

        let call = LlmCallRequest {
            service_id: None,
            messages: vec![
                ChatMessage::system(
                    "You name agents. Reply with a single short human first name, \
                     nothing else.",
                ),
                ChatMessage::user(format!(
                    "Name an agent with role '{role_name}' working on: {objective}"
                )),
            ],
            tools: vec![],
            tool_choice: None,
        };

        match self.llm.chat(call, CancellationToken::new()).await {
            Ok(outcome) => {
                let name = outcome.message.content.as_text();
                let name: String = name
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .trim_matches(['"', '\'', '.'])
                    .chars()
                    .take(MAX_NAME_LEN)
                    .collect();
                if name.is_empty() {
                    fallback
                } else {
                    name
                }
            }
            Err(e) => {
                warn!(error = %e, "naming call failed, using fallback");
                fallback
            }
        }
    }
}

#[async_trait]
impl Tool for SpawnAgentTool {
    fn name(&self) -> &str {
        "spawn_agent_with_task"
    }

    fn description(&self) -> &str {
        "Spawn a child agent of an existing role, hand it a task brief, and send it an initial message."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "roleId": { "type": "string", "description": "Id of the role to instantiate" },
                "taskBrief": {
                    "type": "object",
                    "description": "The delegation contract for the child",
                    "properties": {
                        "objective": { "type": "string" },
                        "constraints": { "type": "array", "items": { "type": "string" } },
                        "inputs": { "type": "string" },
                        "outputs": { "type": "string" },
                        "completion_criteria": { "type": "string" }
                    },
                    "required": ["objective", "completion_criteria"]
                },
                "initialMessage": { "type": "string", "description": "First message delivered to the child" }
            },
            "required": ["roleId", "taskBrief", "initialMessage"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let role_id = required_str(&args, "roleId")?;
        let initial_message = required_str(&args, "initialMessage")?;
        if initial_message.trim().is_empty() {
            return Err(ToolError::MissingParameter(
                "initialMessage must not be empty".into(),
            ));
        }

        let brief_value = args
            .get("taskBrief")
            .cloned()
            .ok_or_else(|| ToolError::MissingParameter("missing required field: taskBrief".into()))?;
        let brief: TaskBrief = serde_json::from_value(brief_value)
            .map_err(|e| ToolError::InvalidTaskBrief(e.to_string()))?;
        brief
            .validate()
            .map_err(|e| ToolError::InvalidTaskBrief(e.to_string()))?;

        let role = self
            .org
            .get_role(&role_id)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("no such role: {role_id}")))?;

        // Root's direct children open a fresh workspace for the task;
        // deeper agents share their parent's.
        let workspace_task = if ctx.agent_id == ROOT_AGENT_ID {
            let task_id = ctx
                .task_id
                .clone()
                .unwrap_or_else(|| format!("task-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));
            self.workspaces
                .create_workspace(&task_id)
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            Some(task_id)
        } else {
            self.agents.workspace_task(&ctx.agent_id)
        };

        let sibling_count = self.org.children_of(&ctx.agent_id).len();
        let custom_name = self
            .pick_name(&role.name, &brief.objective, sibling_count)
            .await;

        let record = self
            .agents
            .spawn(SpawnAgent {
                role_id: role_id.clone(),
                parent_id: ctx.agent_id.clone(),
                custom_name: Some(custom_name.clone()),
                brief: Some(brief),
                workspace_task: workspace_task.clone(),
                service_id: role.preferred_service.clone(),
            })
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let message_id = self
            .bus
            .send(SendMessage {
                from: ctx.agent_id.clone(),
                to: record.id.clone(),
                payload: agora_types::Payload::text(initial_message),
                task_id: workspace_task.clone(),
                deliver_at: None,
                message_type: Some(MessageType::TaskAssignment),
            })
            .map_err(|e| ToolError::ExecutionFailed(format!("initial message failed: {e}")))?;

        debug!(
            agent = %record.id,
            name = %custom_name,
            role = %role_id,
            parent = %ctx.agent_id,
            "agent spawned via tool"
        );

        Ok(json!({
            "agentId": record.id,
            "name": custom_name,
            "taskId": workspace_task,
            "initialMessageId": message_id.to_string(),
        }))
    }
}
