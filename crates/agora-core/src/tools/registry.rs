//! Tool registry and [`Tool`] trait definition.
//!
//! Defines the interface all tool implementations must satisfy and the
//! [`ToolRegistry`] that stores registered tools and dispatches calls
//! by name. Tool implementations live in the `agora-tools` crate; this
//! module only defines the contract and registry infrastructure.
//!
//! # Dispatch contract
//!
//! Tools never throw into the LLM dispatch layer: every failure is a
//! [`ToolError`] that serializes to `{"error": <code>, "message": ...}`
//! with a stable code. [`ToolRegistry::dispatch`] performs that
//! serialization so the conversation loop always gets a JSON value to
//! hand back to the model.
//!
//! # Permissions
//!
//! Each tool belongs to a *tool group*. Roles may restrict the groups
//! their agents can use; an empty group list on the role means no
//! restriction. Group gating applies both to the advertised schemas and
//! to dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agora_types::message::PayloadError;

/// Default tool group for catalogue tools.
pub const GROUP_CORE: &str = "core";

/// Caller identity passed into every tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Agent id of the caller.
    pub agent_id: String,
    /// Task correlation id of the message being processed, if any.
    pub task_id: Option<String>,
    /// Id of the message that triggered the current conversation turn.
    pub message_id: Option<String>,
}

impl ToolContext {
    /// Context for `agent_id` with no task binding.
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: None,
            message_id: None,
        }
    }
}

/// Error type for tool execution.
///
/// Every variant carries a stable string code (see [`code`](Self::code))
/// matching the runtime's error taxonomy; [`to_json`](Self::to_json)
/// produces the structured form returned to the LLM.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The requested tool is not in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A required parameter is missing or has the wrong shape.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// A path argument is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A path argument escapes its workspace.
    #[error("path traversal blocked: {0}")]
    PathTraversalBlocked(String),

    /// A task brief failed validation.
    #[error("invalid task brief: {0}")]
    InvalidTaskBrief(String),

    /// A message route is forbidden (e.g. user -> user).
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// The message recipient is not registered on the bus.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    /// Payload validation failed (quick replies, typed payloads).
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The target of a terminate call is not a descendant of the caller.
    #[error("not a child agent: {0}")]
    NotChildAgent(String),

    /// The caller's role does not grant access to this tool.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The referenced artifact does not exist.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// The referenced workspace file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The caller has no workspace bound to its task.
    #[error("no workspace bound to this agent")]
    WorkspaceNotBound,

    /// Submitted code matched a blocked sandbox pattern.
    #[error("blocked code: {0}")]
    BlockedCode(String),

    /// The local-LLM path is disabled or not yet available.
    #[error("local llm not ready")]
    LocalLlmNotReady,

    /// The target agent is already stopped.
    #[error("already stopped: {0}")]
    AlreadyStopped(String),

    /// The tool failed at runtime for a reason outside the taxonomy.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    /// Stable error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::MissingParameter(_) => "missing_parameter",
            ToolError::InvalidPath(_) => "invalid_path",
            ToolError::PathTraversalBlocked(_) => "path_traversal_blocked",
            ToolError::InvalidTaskBrief(_) => "invalid_task_brief",
            ToolError::InvalidRoute(_) => "invalid_route",
            ToolError::UnknownRecipient(_) => "unknown_recipient",
            ToolError::Payload(e) => e.code(),
            ToolError::NotChildAgent(_) => "not_child_agent",
            ToolError::AccessDenied(_) => "access_denied",
            ToolError::ArtifactNotFound(_) => "artifact_not_found",
            ToolError::FileNotFound(_) => "file_not_found",
            ToolError::WorkspaceNotBound => "workspace_not_bound",
            ToolError::BlockedCode(_) => "blocked_code",
            ToolError::LocalLlmNotReady => "localllm_not_ready",
            ToolError::AlreadyStopped(_) => "already_stopped",
            ToolError::ExecutionFailed(_) => "execution_failed",
        }
    }

    /// Structured `{error, message}` form returned to the LLM.
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.code(),
            "message": self.to_string(),
        })
    }
}

/// Extract a required string field from a JSON arguments object.
pub fn required_str(args: &Value, field: &str) -> Result<String, ToolError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ToolError::MissingParameter(format!("missing required field: {field}")))
}

/// Extract an optional string field from a JSON arguments object.
pub fn optional_str(args: &Value, field: &str) -> Option<String> {
    args.get(field).and_then(|v| v.as_str()).map(String::from)
}

/// A tool invocable by the conversation loop.
///
/// Implementations provide a name, description, JSON Schema for
/// parameters, and an async `execute`. Tools are registered in a
/// [`ToolRegistry`] and dispatched by name when the LLM emits a
/// tool-call request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in LLM function calling).
    fn name(&self) -> &str;

    /// A human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters(&self) -> Value;

    /// The tool group this tool belongs to, for role-based gating.
    fn group(&self) -> &str {
        GROUP_CORE
    }

    /// Execute the tool with the given caller context and arguments.
    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError>;
}

/// Registry of available tools, indexed by name.
///
/// Provides lookup, schema generation in OpenAI function-calling
/// format, group-gated dispatch, and structured error serialization.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!(tool = %name, group = %tool.group(), "registering tool");
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List registered tool names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether `allowed_groups` grants access to `tool`.
    /// An empty group list means no restriction.
    fn group_allowed(tool: &dyn Tool, allowed_groups: &[String]) -> bool {
        allowed_groups.is_empty() || allowed_groups.iter().any(|g| g == tool.group())
    }

    /// Tool schemas in OpenAI function-calling format, filtered by the
    /// caller's allowed tool groups and sorted by name.
    pub fn schemas(&self, allowed_groups: &[String]) -> Vec<Value> {
        let mut schemas: Vec<(String, Value)> = self
            .tools
            .iter()
            .filter(|(_, tool)| Self::group_allowed(tool.as_ref(), allowed_groups))
            .map(|(name, tool)| {
                let schema = json!({
                    "type": "function",
                    "function": {
                        "name": name,
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                });
                (name.clone(), schema)
            })
            .collect();
        schemas.sort_by(|a, b| a.0.cmp(&b.0));
        schemas.into_iter().map(|(_, v)| v).collect()
    }

    /// Execute a tool by name with group gating.
    ///
    /// Returns [`ToolError::UnknownTool`] for unregistered names and
    /// [`ToolError::AccessDenied`] when the caller's groups do not
    /// include the tool's group.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
        allowed_groups: &[String],
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if !Self::group_allowed(tool.as_ref(), allowed_groups) {
            return Err(ToolError::AccessDenied(format!(
                "tool '{name}' is outside the caller's allowed tool groups"
            )));
        }

        debug!(tool = %name, agent = %ctx.agent_id, "executing tool");
        tool.execute(ctx, args).await
    }

    /// Execute a tool and always produce a JSON value: success output on
    /// success, structured `{error, message}` on failure.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
        allowed_groups: &[String],
    ) -> Value {
        match self.execute(ctx, name, args, allowed_groups).await {
            Ok(value) => value,
            Err(err) => {
                debug!(tool = %name, code = err.code(), "tool returned error");
                err.to_json()
            }
        }
    }
}
