//! Artifact tools: `put_artifact` and `get_artifact`.
//!
//! `get_artifact` routes the stored content through the caller's
//! service capabilities, so a text-only agent asking for a PNG gets a
//! degraded description instead of raw bytes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agora_core::agents::AgentManager;
use agora_core::artifact::{ArtifactError, ArtifactStore, PutContent};
use agora_core::org::OrgStore;
use agora_core::router::ContentRouter;
use agora_core::tools::registry::{required_str, Tool, ToolContext, ToolError};
use agora_llm::client::LlmClient;
use agora_llm::types::ContentPart;
use agora_types::service::ServiceConfig;

fn map_artifact_error(err: ArtifactError) -> ToolError {
    match err {
        ArtifactError::NotFound(r) | ArtifactError::InvalidRef(r) => ToolError::ArtifactNotFound(r),
        other => ToolError::ExecutionFailed(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// PutArtifactTool
// ---------------------------------------------------------------------------

/// Store a produced artifact and return its reference.
pub struct PutArtifactTool {
    store: Arc<ArtifactStore>,
}

impl PutArtifactTool {
    /// Create the tool over the artifact store.
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PutArtifactTool {
    fn name(&self) -> &str {
        "put_artifact"
    }

    fn description(&self) -> &str {
        "Store a produced artifact (text or structured JSON) and get back an artifact reference."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "description": "Artifact type, e.g. 'text/plain', 'json'" },
                "content": { "description": "The content: a string, or any JSON value" },
                "name": { "type": "string", "description": "Filename recorded in metadata" },
                "meta": { "type": "object", "description": "Extra metadata key-values" }
            },
            "required": ["type", "content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let artifact_type = required_str(&args, "type")?;
        let content_value = args
            .get("content")
            .cloned()
            .ok_or_else(|| ToolError::MissingParameter("missing required field: content".into()))?;

        let content = match content_value {
            Value::String(text) => PutContent::Text(text),
            other => PutContent::Json(other),
        };

        let mut meta = match args.get("meta") {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(name) = args.get("name").and_then(|v| v.as_str()) {
            meta.insert("filename".into(), Value::String(name.to_string()));
        }

        let reference = self
            .store
            .put(&artifact_type, content, meta, ctx.message_id.clone())
            .map_err(map_artifact_error)?;

        debug!(agent = %ctx.agent_id, reference = %reference, "artifact stored via tool");
        Ok(json!({ "artifactIds": [reference] }))
    }
}

// ---------------------------------------------------------------------------
// GetArtifactTool
// ---------------------------------------------------------------------------

/// Fetch an artifact, routed for the calling agent's model.
pub struct GetArtifactTool {
    router: Arc<ContentRouter>,
    agents: Arc<AgentManager>,
    org: Arc<OrgStore>,
    llm: Arc<LlmClient>,
}

impl GetArtifactTool {
    /// Wire the tool from its collaborators.
    pub fn new(
        router: Arc<ContentRouter>,
        agents: Arc<AgentManager>,
        org: Arc<OrgStore>,
        llm: Arc<LlmClient>,
    ) -> Self {
        Self {
            router,
            agents,
            org,
            llm,
        }
    }

    /// The service config in effect for a calling agent.
    fn service_for(&self, agent_id: &str) -> Option<ServiceConfig> {
        let service_id = self.agents.service_id(agent_id).or_else(|| {
            self.org
                .get_agent(agent_id)
                .and_then(|a| self.org.get_role(&a.role_id))
                .and_then(|r| r.preferred_service)
        });
        service_id
            .as_deref()
            .and_then(|id| self.llm.service(id))
            .or_else(|| self.llm.default_service())
            .cloned()
    }
}

#[async_trait]
impl Tool for GetArtifactTool {
    fn name(&self) -> &str {
        "get_artifact"
    }

    fn description(&self) -> &str {
        "Fetch a stored artifact by reference. Content is adapted to what your model can read."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ref": { "type": "string", "description": "Artifact reference (artifact:<uuid>)" }
            },
            "required": ["ref"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let reference = required_str(&args, "ref")?;
        let service = self
            .service_for(&ctx.agent_id)
            .ok_or_else(|| ToolError::ExecutionFailed("no LLM service configured".into()))?;

        let artifact = self
            .router
            .store()
            .get(&reference)
            .map_err(map_artifact_error)?;
        let routed = self.router.route(&artifact, &service);

        let content = match &routed.part {
            ContentPart::Text { text } => Value::String(text.clone()),
            part => serde_json::to_value(part)
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?,
        };

        Ok(json!({
            "routing": routed.routing.label(),
            "type": artifact.artifact_type,
            "meta": artifact.meta,
            "content": content,
        }))
    }
}
