//! Workspace I/O tools, confined to the caller's task workspace.
//!
//! Each tool resolves the caller's workspace binding (set at spawn, or
//! the task id of the message being processed) and fails with
//! `workspace_not_bound` when there is none. Path safety is enforced by
//! the [`WorkspaceManager`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agora_core::agents::AgentManager;
use agora_core::tools::registry::{required_str, Tool, ToolContext, ToolError};
use agora_core::workspace::{WorkspaceError, WorkspaceManager};

fn map_workspace_error(err: WorkspaceError) -> ToolError {
    match err {
        WorkspaceError::PathTraversal(p) => ToolError::PathTraversalBlocked(p),
        WorkspaceError::InvalidTaskId(p) => ToolError::InvalidPath(p),
        WorkspaceError::FileNotFound(p) => ToolError::FileNotFound(p),
        other => ToolError::ExecutionFailed(other.to_string()),
    }
}

/// The workspace (task id) a caller is allowed to touch.
fn bound_task(agents: &AgentManager, ctx: &ToolContext) -> Result<String, ToolError> {
    agents
        .workspace_task(&ctx.agent_id)
        .or_else(|| ctx.task_id.clone())
        .ok_or(ToolError::WorkspaceNotBound)
}

// ---------------------------------------------------------------------------
// ReadWorkspaceFileTool
// ---------------------------------------------------------------------------

/// Read a file from the caller's workspace.
pub struct ReadWorkspaceFileTool {
    workspaces: Arc<WorkspaceManager>,
    agents: Arc<AgentManager>,
}

impl ReadWorkspaceFileTool {
    /// Wire the tool from its collaborators.
    pub fn new(workspaces: Arc<WorkspaceManager>, agents: Arc<AgentManager>) -> Self {
        Self { workspaces, agents }
    }
}

#[async_trait]
impl Tool for ReadWorkspaceFileTool {
    fn name(&self) -> &str {
        "read_workspace_file"
    }

    fn description(&self) -> &str {
        "Read a file from your task workspace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let path = required_str(&args, "path")?;
        let task = bound_task(&self.agents, ctx)?;
        let bytes = self
            .workspaces
            .read_file(&task, &path)
            .map_err(map_workspace_error)?;
        Ok(json!({
            "path": path,
            "content": String::from_utf8_lossy(&bytes).into_owned(),
        }))
    }
}

// ---------------------------------------------------------------------------
// WriteWorkspaceFileTool
// ---------------------------------------------------------------------------

/// Write a file into the caller's workspace.
pub struct WriteWorkspaceFileTool {
    workspaces: Arc<WorkspaceManager>,
    agents: Arc<AgentManager>,
}

impl WriteWorkspaceFileTool {
    /// Wire the tool from its collaborators.
    pub fn new(workspaces: Arc<WorkspaceManager>, agents: Arc<AgentManager>) -> Self {
        Self { workspaces, agents }
    }
}

#[async_trait]
impl Tool for WriteWorkspaceFileTool {
    fn name(&self) -> &str {
        "write_workspace_file"
    }

    fn description(&self) -> &str {
        "Write a file into your task workspace, creating parent directories as needed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "File content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let task = bound_task(&self.agents, ctx)?;
        self.workspaces
            .write_file(&task, &path, content.as_bytes())
            .map_err(map_workspace_error)?;
        debug!(agent = %ctx.agent_id, task = %task, path = %path, "workspace file written");
        Ok(json!({ "path": path, "bytes": content.len() }))
    }
}

// ---------------------------------------------------------------------------
// ListWorkspaceFilesTool
// ---------------------------------------------------------------------------

/// List files in the caller's workspace.
pub struct ListWorkspaceFilesTool {
    workspaces: Arc<WorkspaceManager>,
    agents: Arc<AgentManager>,
}

impl ListWorkspaceFilesTool {
    /// Wire the tool from its collaborators.
    pub fn new(workspaces: Arc<WorkspaceManager>, agents: Arc<AgentManager>) -> Self {
        Self { workspaces, agents }
    }
}

#[async_trait]
impl Tool for ListWorkspaceFilesTool {
    fn name(&self) -> &str {
        "list_workspace_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory in your task workspace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory relative to the workspace root (default '.')" }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let task = bound_task(&self.agents, ctx)?;
        let entries = self
            .workspaces
            .list_files(&task, &path)
            .map_err(map_workspace_error)?;
        let info = self
            .workspaces
            .workspace_info(&task)
            .map_err(map_workspace_error)?;
        Ok(json!({ "entries": entries, "info": info }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::bus::MessageBus;
    use agora_core::events::EventBus;
    use agora_core::org::{CreateRole, OrgStore};
    use agora_core::agents::SpawnAgent;
    use agora_types::ROOT_AGENT_ID;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        read: ReadWorkspaceFileTool,
        write: WriteWorkspaceFileTool,
        list: ListWorkspaceFilesTool,
        bound_agent: String,
        unbound_agent: String,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let org = Arc::new(OrgStore::open(tmp.path().join("org")).unwrap());
        let bus = Arc::new(MessageBus::new());
        let agents = Arc::new(AgentManager::new(org.clone(), bus, EventBus::new()));
        agents.register_sentinels(None);
        let workspaces = Arc::new(WorkspaceManager::new(tmp.path().join("workspaces")).unwrap());

        let role = org
            .create_role(CreateRole {
                name: "worker".into(),
                role_prompt: "Work.".into(),
                org_prompt: None,
                tool_groups: vec![],
                preferred_service: None,
                created_by: ROOT_AGENT_ID.into(),
            })
            .unwrap();

        let bound_agent = agents
            .spawn(SpawnAgent {
                role_id: role.id.clone(),
                parent_id: ROOT_AGENT_ID.into(),
                custom_name: None,
                brief: None,
                workspace_task: Some("task-1".into()),
                service_id: None,
            })
            .unwrap()
            .id;
        let unbound_agent = agents
            .spawn(SpawnAgent {
                role_id: role.id,
                parent_id: ROOT_AGENT_ID.into(),
                custom_name: None,
                brief: None,
                workspace_task: None,
                service_id: None,
            })
            .unwrap()
            .id;

        Fixture {
            _tmp: tmp,
            read: ReadWorkspaceFileTool::new(workspaces.clone(), agents.clone()),
            write: WriteWorkspaceFileTool::new(workspaces.clone(), agents.clone()),
            list: ListWorkspaceFilesTool::new(workspaces, agents),
            bound_agent,
            unbound_agent,
        }
    }

    fn ctx(agent: &str) -> ToolContext {
        ToolContext::for_agent(agent)
    }

    #[tokio::test]
    async fn write_read_list_roundtrip() {
        let fx = fixture();
        let caller = ctx(&fx.bound_agent);

        fx.write
            .execute(&caller, json!({"path": "notes/plan.md", "content": "step one"}))
            .await
            .unwrap();

        let out = fx
            .read
            .execute(&caller, json!({"path": "notes/plan.md"}))
            .await
            .unwrap();
        assert_eq!(out["content"], "step one");

        let out = fx.list.execute(&caller, json!({})).await.unwrap();
        assert_eq!(out["entries"][0]["path"], "notes");
        assert_eq!(out["info"]["file_count"], 1);
    }

    #[tokio::test]
    async fn unbound_agent_gets_workspace_not_bound() {
        let fx = fixture();
        let caller = ctx(&fx.unbound_agent);
        let err = fx
            .read
            .execute(&caller, json!({"path": "x.txt"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "workspace_not_bound");
    }

    #[tokio::test]
    async fn message_task_id_binds_when_agent_has_none() {
        let fx = fixture();
        let caller = ToolContext {
            agent_id: fx.unbound_agent.clone(),
            task_id: Some("task-77".into()),
            message_id: None,
        };
        fx.write
            .execute(&caller, json!({"path": "a.txt", "content": "x"}))
            .await
            .unwrap();
        let out = fx.read.execute(&caller, json!({"path": "a.txt"})).await.unwrap();
        assert_eq!(out["content"], "x");
    }

    #[tokio::test]
    async fn traversal_blocked_with_stable_code() {
        let fx = fixture();
        let caller = ctx(&fx.bound_agent);
        let err = fx
            .write
            .execute(
                &caller,
                json!({"path": "../escape.txt", "content": "x"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "path_traversal_blocked");
    }

    #[tokio::test]
    async fn missing_file_reported() {
        let fx = fixture();
        let caller = ctx(&fx.bound_agent);
        let err = fx
            .read
            .execute(&caller, json!({"path": "nope.txt"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "file_not_found");
    }

    #[tokio::test]
    async fn list_on_fresh_workspace_is_empty() {
        let fx = fixture();
        let caller = ctx(&fx.bound_agent);
        let out = fx.list.execute(&caller, json!({})).await.unwrap();
        assert_eq!(out["entries"].as_array().unwrap().len(), 0);
    }
}
