//! System prompt assembly for one LLM turn.
//!
//! The prompt concatenates, in order: the role prompt, the
//! org-architecture prompt (the agent's own or the one inherited from
//! its creator), runtime facts (ids, task, time), the task brief block,
//! the contact list, and - once context usage crosses a soft threshold -
//! a hint asking the agent to wrap up.

use chrono::{DateTime, Utc};

use agora_types::org::{AgentRecord, RoleRecord};
use agora_types::TaskBrief;

use crate::conversation::ContextStatus;

/// One row of the contact list shown to an agent.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Agent id to address messages to.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Role name.
    pub role: String,
}

/// Everything the builder needs for one turn.
pub struct PromptInputs<'a> {
    /// The agent's role record.
    pub role: &'a RoleRecord,
    /// Org prompt inherited from the creator when the role has none.
    pub inherited_org_prompt: Option<&'a str>,
    /// The agent record.
    pub agent: &'a AgentRecord,
    /// Task correlation id of the message being processed.
    pub task_id: Option<&'a str>,
    /// The agent's task brief, if bound.
    pub brief: Option<&'a TaskBrief>,
    /// Peers the agent may message.
    pub contacts: &'a [Contact],
    /// Current context usage.
    pub status: ContextStatus,
    /// Current time.
    pub now: DateTime<Utc>,
}

/// Assembles the system prompt for each LLM turn.
pub struct ContextBuilder {
    hint_threshold: f64,
}

impl ContextBuilder {
    /// Create a builder; `hint_threshold` is the context-usage ratio at
    /// which the wrap-up hint is included.
    pub fn new(hint_threshold: f64) -> Self {
        Self { hint_threshold }
    }

    /// Build the system prompt from the inputs.
    pub fn build_system_prompt(&self, inputs: &PromptInputs<'_>) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(inputs.role.role_prompt.clone());

        let org_prompt = inputs
            .role
            .org_prompt
            .as_deref()
            .or(inputs.inherited_org_prompt);
        if let Some(org_prompt) = org_prompt {
            if !org_prompt.trim().is_empty() {
                parts.push(org_prompt.to_string());
            }
        }

        let mut facts = String::from("## Runtime\n");
        facts.push_str(&format!("Agent id: {}\n", inputs.agent.id));
        if let Some(name) = inputs.agent.custom_name.as_deref() {
            facts.push_str(&format!("Name: {name}\n"));
        }
        if let Some(parent) = inputs.agent.parent_id.as_deref() {
            facts.push_str(&format!("Parent: {parent}\n"));
        }
        if let Some(task_id) = inputs.task_id {
            facts.push_str(&format!("Task id: {task_id}\n"));
        }
        facts.push_str(&format!(
            "Current time: {}",
            inputs.now.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        parts.push(facts);

        if let Some(brief) = inputs.brief {
            parts.push(brief.render());
        }

        if !inputs.contacts.is_empty() {
            let mut contacts = String::from("## Contacts\nAgents you can message:\n");
            for contact in inputs.contacts {
                contacts.push_str(&format!(
                    "- {} ({}, role: {})\n",
                    contact.id, contact.name, contact.role
                ));
            }
            parts.push(contacts.trim_end().to_string());
        }

        if inputs.status.ratio > self.hint_threshold {
            parts.push(format!(
                "## Context status\nYour conversation context is {:.0}% full \
                 ({} of {} tokens). Summarise your progress, hand off or \
                 finish soon, and avoid long tool outputs.",
                inputs.status.ratio * 100.0,
                inputs.status.estimated_tokens,
                inputs.status.limit
            ));
        }

        parts.join("\n\n")
    }
}
