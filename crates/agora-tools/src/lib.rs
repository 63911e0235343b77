//! Built-in tool catalogue for agora.
//!
//! One file per tool family, mirroring the runtime's tool table:
//!
//! | Tool | Module |
//! |------|--------|
//! | `find_role_by_name`, `create_role`, `get_org_structure` | [`org_tools`] |
//! | `spawn_agent_with_task` | [`spawn_tool`] |
//! | `send_message` | [`message_tool`] |
//! | `put_artifact`, `get_artifact` | [`artifact_tools`] |
//! | `read_workspace_file`, `write_workspace_file`, `list_workspace_files` | [`workspace_tools`] |
//! | `terminate_agent` | [`terminate_tool`] |
//! | `get_context_status` | [`context_tool`] |
//! | `run_javascript` | [`js_tool`] |
//! | `localllm_chat` | [`localllm_tool`] |
//!
//! [`register_catalogue`] wires the whole table into a
//! [`ToolRegistry`](agora_core::ToolRegistry) from a [`CatalogueDeps`]
//! bundle, so the composition layer stays a single call.

pub mod artifact_tools;
pub mod context_tool;
pub mod js_tool;
pub mod localllm_tool;
pub mod message_tool;
pub mod org_tools;
pub mod spawn_tool;
pub mod terminate_tool;
pub mod workspace_tools;

use std::sync::Arc;

use agora_core::{
    AgentManager, ArtifactStore, ContentRouter, ConversationManager, MessageBus, OrgStore,
    ToolRegistry, WorkspaceManager,
};
use agora_llm::client::LlmClient;
use agora_llm::provider::Provider;

pub use js_tool::{CanvasImage, JsSandbox, SandboxOutcome};

/// Everything the catalogue tools need, passed in by the composition
/// layer.
#[derive(Clone)]
pub struct CatalogueDeps {
    /// Persistent org store (roles, agents).
    pub org: Arc<OrgStore>,
    /// Live agent lifecycle manager.
    pub agents: Arc<AgentManager>,
    /// The message bus.
    pub bus: Arc<MessageBus>,
    /// Per-task workspaces.
    pub workspaces: Arc<WorkspaceManager>,
    /// Artifact store.
    pub artifacts: Arc<ArtifactStore>,
    /// Capability-aware content router.
    pub router: Arc<ContentRouter>,
    /// Conversation store (for context status).
    pub conversations: Arc<ConversationManager>,
    /// LLM client (agent naming, service lookup).
    pub llm: Arc<LlmClient>,
    /// JavaScript sandbox, when one is configured.
    pub sandbox: Option<Arc<dyn JsSandbox>>,
    /// Local inference provider, when enabled.
    pub local_llm: Option<Arc<dyn Provider>>,
}

/// Register the full built-in catalogue into `registry`.
pub fn register_catalogue(registry: &mut ToolRegistry, deps: &CatalogueDeps) {
    registry.register(Arc::new(org_tools::FindRoleTool::new(deps.org.clone())));
    registry.register(Arc::new(org_tools::CreateRoleTool::new(deps.org.clone())));
    registry.register(Arc::new(org_tools::OrgStructureTool::new(deps.org.clone())));
    registry.register(Arc::new(spawn_tool::SpawnAgentTool::new(
        deps.org.clone(),
        deps.agents.clone(),
        deps.bus.clone(),
        deps.workspaces.clone(),
        deps.llm.clone(),
    )));
    registry.register(Arc::new(message_tool::SendMessageTool::new(
        deps.bus.clone(),
    )));
    registry.register(Arc::new(artifact_tools::PutArtifactTool::new(
        deps.artifacts.clone(),
    )));
    registry.register(Arc::new(artifact_tools::GetArtifactTool::new(
        deps.router.clone(),
        deps.agents.clone(),
        deps.org.clone(),
        deps.llm.clone(),
    )));
    registry.register(Arc::new(workspace_tools::ReadWorkspaceFileTool::new(
        deps.workspaces.clone(),
        deps.agents.clone(),
    )));
    registry.register(Arc::new(workspace_tools::WriteWorkspaceFileTool::new(
        deps.workspaces.clone(),
        deps.agents.clone(),
    )));
    registry.register(Arc::new(workspace_tools::ListWorkspaceFilesTool::new(
        deps.workspaces.clone(),
        deps.agents.clone(),
    )));
    registry.register(Arc::new(terminate_tool::TerminateAgentTool::new(
        deps.org.clone(),
        deps.agents.clone(),
    )));
    registry.register(Arc::new(context_tool::ContextStatusTool::new(
        deps.conversations.clone(),
    )));
    registry.register(Arc::new(js_tool::RunJavascriptTool::new(
        deps.artifacts.clone(),
        deps.sandbox.clone(),
    )));
    registry.register(Arc::new(localllm_tool::LocalLlmChatTool::new(
        deps.local_llm.clone(),
    )));
}
