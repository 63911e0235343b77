//! Extension interface for pluggable modules.
//!
//! A module (SSH, local-file, browser, ...) contributes tools into the
//! catalogue without the core knowing its internals. Tool names are
//! namespaced `<module_id>__<tool>` to avoid collisions with built-ins
//! and with other modules.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use agora_types::Result;

use crate::tools::registry::{Tool, ToolContext, ToolError, ToolRegistry};

/// A tool contributed by a module.
#[derive(Debug, Clone)]
pub struct ModuleToolDef {
    /// Tool name within the module's namespace (unprefixed).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
}

/// A pluggable module contributing tools to the runtime.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique module id, used as the tool-name namespace prefix.
    fn id(&self) -> &str;

    /// Initialize the module with its configuration section.
    async fn init(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    /// The tools this module contributes.
    fn tool_definitions(&self) -> Vec<ModuleToolDef>;

    /// Execute one of this module's tools. `name` is unprefixed.
    async fn execute_tool(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
    ) -> std::result::Result<Value, ToolError>;

    /// Release module resources on shutdown.
    async fn shutdown(&self) {}
}

/// Adapter exposing one module tool as a registry [`Tool`].
struct ModuleTool {
    module: Arc<dyn Module>,
    namespaced: String,
    inner_name: String,
    description: String,
    parameters: Value,
}

#[async_trait]
impl Tool for ModuleTool {
    fn name(&self) -> &str {
        &self.namespaced
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    fn group(&self) -> &str {
        self.module.id()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> std::result::Result<Value, ToolError> {
        self.module.execute_tool(ctx, &self.inner_name, args).await
    }
}

/// Register every tool a module declares, namespaced by the module id.
pub fn register_module(registry: &mut ToolRegistry, module: Arc<dyn Module>) {
    for def in module.tool_definitions() {
        let namespaced = format!("{}__{}", module.id(), def.name);
        debug!(module = %module.id(), tool = %namespaced, "registering module tool");
        registry.register(Arc::new(ModuleTool {
            module: module.clone(),
            namespaced,
            inner_name: def.name,
            description: def.description,
            parameters: def.parameters,
        }));
    }
}
