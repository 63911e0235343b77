//! Organisation query and role-management tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agora_core::org::{CreateRole, OrgStore};
use agora_core::tools::registry::{required_str, Tool, ToolContext, ToolError};
use agora_types::org::RoleRecord;

fn role_json(role: &RoleRecord) -> Value {
    json!({
        "id": role.id,
        "name": role.name,
        "rolePrompt": role.role_prompt,
        "orgPrompt": role.org_prompt,
        "toolGroups": role.tool_groups,
        "preferredService": role.preferred_service,
        "createdBy": role.created_by,
    })
}

// ---------------------------------------------------------------------------
// FindRoleTool
// ---------------------------------------------------------------------------

/// Look up a role by display name.
pub struct FindRoleTool {
    org: Arc<OrgStore>,
}

impl FindRoleTool {
    /// Create the tool over the org store.
    pub fn new(org: Arc<OrgStore>) -> Self {
        Self { org }
    }
}

#[async_trait]
impl Tool for FindRoleTool {
    fn name(&self) -> &str {
        "find_role_by_name"
    }

    fn description(&self) -> &str {
        "Find an existing role by its display name. Returns the role, or null if none exists."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Role display name to look up" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let name = required_str(&args, "name")?;
        Ok(match self.org.find_role_by_name(&name) {
            Some(role) => json!({ "role": role_json(&role) }),
            None => json!({ "role": null }),
        })
    }
}

// ---------------------------------------------------------------------------
// CreateRoleTool
// ---------------------------------------------------------------------------

/// Create a reusable role. The org prompt is inherited from the
/// caller's role when omitted.
pub struct CreateRoleTool {
    org: Arc<OrgStore>,
}

impl CreateRoleTool {
    /// Create the tool over the org store.
    pub fn new(org: Arc<OrgStore>) -> Self {
        Self { org }
    }
}

#[async_trait]
impl Tool for CreateRoleTool {
    fn name(&self) -> &str {
        "create_role"
    }

    fn description(&self) -> &str {
        "Create a new agent role with a system prompt. Use before spawning agents of a new kind."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Role display name" },
                "rolePrompt": { "type": "string", "description": "System instructions for agents of this role" },
                "orgPrompt": { "type": "string", "description": "Optional organisation-architecture prompt; inherited from your role if omitted" },
                "toolGroups": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tool groups agents of this role may use (empty = all)"
                }
            },
            "required": ["name", "rolePrompt"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let name = required_str(&args, "name")?;
        let role_prompt = required_str(&args, "rolePrompt")?;
        let tool_groups: Vec<String> = args
            .get("toolGroups")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        // Inherit the caller's org prompt when none is given.
        let org_prompt = args
            .get("orgPrompt")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| {
                self.org
                    .get_agent(&ctx.agent_id)
                    .and_then(|agent| self.org.get_role(&agent.role_id))
                    .and_then(|role| role.org_prompt)
            });

        let role = self
            .org
            .create_role(CreateRole {
                name,
                role_prompt,
                org_prompt,
                tool_groups,
                preferred_service: None,
                created_by: ctx.agent_id.clone(),
            })
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        debug!(role = %role.id, creator = %ctx.agent_id, "role created via tool");
        Ok(json!({ "role": role_json(&role) }))
    }
}

// ---------------------------------------------------------------------------
// OrgStructureTool
// ---------------------------------------------------------------------------

/// Report every role with its agents (id and display name).
pub struct OrgStructureTool {
    org: Arc<OrgStore>,
}

impl OrgStructureTool {
    /// Create the tool over the org store.
    pub fn new(org: Arc<OrgStore>) -> Self {
        Self { org }
    }
}

#[async_trait]
impl Tool for OrgStructureTool {
    fn name(&self) -> &str {
        "get_org_structure"
    }

    fn description(&self) -> &str {
        "List all roles together with their agents (id and name), plus the agent tree."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        let agents = self.org.list_agents();
        let roles: Vec<Value> = self
            .org
            .list_roles()
            .iter()
            .map(|role| {
                let members: Vec<Value> = agents
                    .iter()
                    .filter(|a| a.role_id == role.id)
                    .map(|a| json!({ "id": a.id, "name": a.display_name() }))
                    .collect();
                json!({ "id": role.id, "name": role.name, "agents": members })
            })
            .collect();

        let tree = serde_json::to_value(self.org.org_tree())
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(json!({ "roles": roles, "tree": tree }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::ROOT_AGENT_ID;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<OrgStore>) {
        let tmp = TempDir::new().unwrap();
        let org = Arc::new(OrgStore::open(tmp.path().join("org")).unwrap());
        (tmp, org)
    }

    fn root_ctx() -> ToolContext {
        ToolContext::for_agent(ROOT_AGENT_ID)
    }

    #[tokio::test]
    async fn create_then_find_role() {
        let (_tmp, org) = setup();
        let create = CreateRoleTool::new(org.clone());
        let out = create
            .execute(
                &root_ctx(),
                json!({"name": "planner", "rolePrompt": "You plan.", "toolGroups": ["core"]}),
            )
            .await
            .unwrap();
        assert_eq!(out["role"]["name"], "planner");
        let role_id = out["role"]["id"].as_str().unwrap().to_string();

        let find = FindRoleTool::new(org.clone());
        let out = find
            .execute(&root_ctx(), json!({"name": "planner"}))
            .await
            .unwrap();
        assert_eq!(out["role"]["id"], role_id.as_str());

        let out = find
            .execute(&root_ctx(), json!({"name": "ghost"}))
            .await
            .unwrap();
        assert!(out["role"].is_null());
    }

    #[tokio::test]
    async fn create_role_requires_fields() {
        let (_tmp, org) = setup();
        let create = CreateRoleTool::new(org);
        let err = create
            .execute(&root_ctx(), json!({"name": "planner"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "missing_parameter");
    }

    #[tokio::test]
    async fn org_prompt_inherited_from_caller_role() {
        let (_tmp, org) = setup();
        // Give the sentinel role an org prompt to inherit.
        org.update_role(
            agora_core::org::SENTINEL_ROLE_ID,
            agora_core::org::UpdateRole {
                name: None,
                org_prompt: Some("Flat teams.".into()),
            },
        )
        .unwrap();

        let create = CreateRoleTool::new(org.clone());
        let out = create
            .execute(
                &root_ctx(),
                json!({"name": "worker", "rolePrompt": "Work."}),
            )
            .await
            .unwrap();
        assert_eq!(out["role"]["orgPrompt"], "Flat teams.");
    }

    #[tokio::test]
    async fn org_structure_lists_roles_and_agents() {
        let (_tmp, org) = setup();
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
        org.create_agent(agora_core::org::CreateAgent {
            role_id: role.id.clone(),
            parent_id: ROOT_AGENT_ID.into(),
            custom_name: Some("Ada".into()),
        })
        .unwrap();

        let tool = OrgStructureTool::new(org);
        let out = tool.execute(&root_ctx(), json!({})).await.unwrap();

        let roles = out["roles"].as_array().unwrap();
        let worker = roles
            .iter()
            .find(|r| r["name"] == "worker")
            .expect("worker role listed");
        assert_eq!(worker["agents"][0]["name"], "Ada");
        assert_eq!(out["tree"]["id"], ROOT_AGENT_ID);
    }
}
