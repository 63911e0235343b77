//! The per-message conversation loop.
//!
//! For each inbound envelope delivered to an agent, [`LlmHandler`]:
//!
//! 1. appends the message (attachments routed per the agent's service
//!    capabilities) as a user turn;
//! 2. builds the system prompt and calls the LLM;
//! 3. dispatches any returned tool calls sequentially, in order,
//!    appending the assistant turn and every tool result;
//! 4. loops until the model answers with plain content, the tool-round
//!    bound is hit, or the agent is aborted.
//!
//! History consistency under cancellation: an assistant turn is only
//! appended once its response has fully arrived, and a committed
//! tool-call turn always gets one result turn per call (calls skipped
//! because of an abort are answered with a structured `already_stopped`
//! result).
//!
//! Unrecoverable failures (LLM retries exhausted, tool-round bound) are
//! published on the event stream and reported to the agent's parent as
//! a synthesized `status_report` message.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use agora_llm::client::{LlmCallRequest, LlmClient};
use agora_llm::error::ProviderError;
use agora_llm::types::{ChatMessage, ContentPart, MessageContent};
use agora_types::message::{Envelope, MessageType, Payload};
use agora_types::org::{AgentRecord, ComputeStatus, ROOT_AGENT_ID, USER_AGENT_ID};
use agora_types::service::ServiceConfig;
use agora_types::{AgoraError, Result};

use crate::agents::AgentManager;
use crate::bus::{MessageBus, SendMessage};
use crate::context::{Contact, ContextBuilder, PromptInputs};
use crate::conversation::ConversationManager;
use crate::events::{EventBus, RuntimeEvent};
use crate::org::OrgStore;
use crate::router::ContentRouter;
use crate::tools::registry::{ToolContext, ToolRegistry};

/// Maximum bytes of a single tool result fed back to the model.
const MAX_TOOL_RESULT_BYTES: usize = 65_536;

/// The per-message interaction loop.
pub struct LlmHandler {
    org: Arc<OrgStore>,
    agents: Arc<AgentManager>,
    bus: Arc<MessageBus>,
    conversations: Arc<ConversationManager>,
    context: ContextBuilder,
    router: Arc<ContentRouter>,
    llm: Arc<LlmClient>,
    registry: Arc<ToolRegistry>,
    events: EventBus,
    max_tool_rounds: u32,
}

impl LlmHandler {
    /// Wire a handler from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org: Arc<OrgStore>,
        agents: Arc<AgentManager>,
        bus: Arc<MessageBus>,
        conversations: Arc<ConversationManager>,
        context: ContextBuilder,
        router: Arc<ContentRouter>,
        llm: Arc<LlmClient>,
        registry: Arc<ToolRegistry>,
        events: EventBus,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            org,
            agents,
            bus,
            conversations,
            context,
            router,
            llm,
            registry,
            events,
            max_tool_rounds,
        }
    }

    /// Process one inbound envelope addressed to `agent_id`.
    pub async fn handle(&self, agent_id: &str, envelope: Envelope) -> Result<()> {
        self.org.touch(agent_id);

        let record = self
            .org
            .get_agent(agent_id)
            .ok_or_else(|| AgoraError::Org(format!("no such agent: {agent_id}")))?;
        let role = self
            .org
            .get_role(&record.role_id)
            .ok_or_else(|| AgoraError::Org(format!("no such role: {}", record.role_id)))?;

        let service_id = self
            .agents
            .service_id(agent_id)
            .or_else(|| role.preferred_service.clone());
        let service = service_id
            .as_deref()
            .and_then(|id| self.llm.service(id))
            .or_else(|| self.llm.default_service())
            .cloned()
            .ok_or_else(|| AgoraError::ConfigInvalid {
                reason: "no LLM service configured".into(),
            })?;
        self.conversations.set_limit(agent_id, service.context_window);

        let task_id = envelope
            .task_id
            .clone()
            .or_else(|| self.agents.workspace_task(agent_id));

        let content = self.inbound_content(&envelope, &service);
        self.conversations.append_user(agent_id, content);

        let ctx = ToolContext {
            agent_id: agent_id.to_string(),
            task_id: task_id.clone(),
            message_id: Some(envelope.id.to_string()),
        };

        let mut rounds_done: u32 = 0;
        loop {
            // An abort or terminate between rounds ends the loop.
            match self.agents.status(agent_id) {
                Some(ComputeStatus::Processing) => {}
                other => {
                    debug!(agent = %agent_id, status = ?other, "loop stopped by status change");
                    break;
                }
            }

            self.conversations.compress_if_needed(agent_id);
            let status = self.conversations.status(agent_id);

            let system_prompt = self.context.build_system_prompt(&PromptInputs {
                role: &role,
                inherited_org_prompt: self.inherited_org_prompt(&record).as_deref(),
                agent: &record,
                task_id: task_id.as_deref(),
                brief: self.agents.brief(agent_id).as_ref(),
                contacts: &self.contacts_for(agent_id, &record),
                status,
                now: chrono::Utc::now(),
            });

            let mut messages = vec![ChatMessage::system(system_prompt)];
            messages.extend(self.conversations.messages(agent_id));

            let call = LlmCallRequest {
                service_id: Some(service.id.clone()),
                messages,
                tools: self.registry.schemas(&role.tool_groups),
                tool_choice: None,
            };
            let cancel = self
                .agents
                .cancel_token(agent_id)
                .unwrap_or_default();

            self.agents.set_status(agent_id, ComputeStatus::WaitingLlm);
            let outcome = self.llm.chat(call, cancel.clone()).await;
            self.agents.set_status(agent_id, ComputeStatus::Processing);

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(ProviderError::Aborted) => {
                    debug!(agent = %agent_id, "llm call aborted");
                    break;
                }
                Err(err) => {
                    error!(agent = %agent_id, error = %err, "llm call failed for good");
                    self.events.publish(RuntimeEvent::LlmFailure {
                        agent_id: Some(agent_id.to_string()),
                        service: service.id.clone(),
                        code: err.code().to_string(),
                        error: err.to_string(),
                    });
                    self.notify_parent(
                        agent_id,
                        &record,
                        task_id.as_deref(),
                        err.code(),
                        &format!("LLM call failed: {err}"),
                    );
                    break;
                }
            };

            // The response is fully received: commit the assistant turn.
            self.conversations
                .append_assistant(agent_id, outcome.message.clone());

            let tool_calls = match outcome.message.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => {
                    debug!(agent = %agent_id, "assistant finished without tool calls");
                    break;
                }
            };

            if rounds_done >= self.max_tool_rounds {
                warn!(agent = %agent_id, rounds = rounds_done, "tool-round bound exceeded");
                // Answer the dangling calls so the history stays valid.
                for call in &tool_calls {
                    self.conversations.append_tool_result(
                        agent_id,
                        &call.id,
                        &call.function.name,
                        json!({
                            "error": "max_tool_rounds_exceeded",
                            "message": format!(
                                "tool-call round limit of {} reached",
                                self.max_tool_rounds
                            ),
                        })
                        .to_string(),
                    );
                }
                self.events.publish(RuntimeEvent::ToolRoundsExceeded {
                    agent_id: agent_id.to_string(),
                    rounds: rounds_done,
                });
                self.notify_parent(
                    agent_id,
                    &record,
                    task_id.as_deref(),
                    "max_tool_rounds_exceeded",
                    &format!(
                        "stopped after {} consecutive tool-call rounds",
                        self.max_tool_rounds
                    ),
                );
                break;
            }

            // Dispatch sequentially, preserving the model's order. Every
            // committed call gets a result turn, even past an abort.
            for call in &tool_calls {
                let result = if cancel.is_cancelled() {
                    json!({
                        "error": "already_stopped",
                        "message": "agent was stopped before this tool call was dispatched",
                    })
                } else {
                    match serde_json::from_str::<Value>(&call.function.arguments) {
                        Err(e) => json!({
                            "error": "missing_parameter",
                            "message": format!("tool arguments are not valid JSON: {e}"),
                        }),
                        Ok(args) => {
                            self.registry
                                .dispatch(&ctx, &call.function.name, args, &role.tool_groups)
                                .await
                        }
                    }
                };

                self.conversations.append_tool_result(
                    agent_id,
                    &call.id,
                    &call.function.name,
                    truncate_result(&result),
                );
            }

            rounds_done += 1;
        }

        if let Err(e) = self.conversations.snapshot(agent_id) {
            warn!(agent = %agent_id, error = %e, "conversation snapshot failed");
        }
        Ok(())
    }

    /// Render an inbound envelope into the user-turn content, routing
    /// attachments per the service's capabilities.
    fn inbound_content(&self, envelope: &Envelope, service: &ServiceConfig) -> MessageContent {
        let text = if envelope.from == USER_AGENT_ID {
            envelope.payload.text.clone()
        } else {
            format!("[from {}] {}", envelope.from, envelope.payload.text)
        };

        if envelope.payload.attachments.is_empty() {
            return MessageContent::Text(text);
        }

        let mut parts = vec![ContentPart::text(text)];
        for attachment in &envelope.payload.attachments {
            match self.router.route_ref(&attachment.artifact_ref, service) {
                Ok(routed) => parts.push(routed.part),
                Err(e) => {
                    warn!(artifact = %attachment.artifact_ref, error = %e, "attachment unavailable");
                    parts.push(ContentPart::text(format!(
                        "[Attachment unavailable] {} ({})",
                        attachment
                            .filename
                            .as_deref()
                            .unwrap_or(&attachment.artifact_ref),
                        attachment.artifact_ref
                    )));
                }
            }
        }
        MessageContent::Parts(parts)
    }

    /// Org prompt inherited from the creator's role when the agent's
    /// own role has none.
    fn inherited_org_prompt(&self, record: &AgentRecord) -> Option<String> {
        let parent_id = record.parent_id.as_deref()?;
        let parent = self.org.get_agent(parent_id)?;
        let parent_role = self.org.get_role(&parent.role_id)?;
        parent_role.org_prompt
    }

    /// The peers an agent may message: its parent, its live children,
    /// and (for root) the user endpoint.
    fn contacts_for(&self, agent_id: &str, record: &AgentRecord) -> Vec<Contact> {
        let mut contacts = Vec::new();

        if let Some(parent_id) = record.parent_id.as_deref() {
            if let Some(parent) = self.org.get_agent(parent_id) {
                contacts.push(Contact {
                    id: parent.id.clone(),
                    name: parent.display_name().to_string(),
                    role: self.role_name(&parent.role_id),
                });
            }
        }

        for child in self.org.children_of(agent_id) {
            if self.agents.is_live(&child.id) {
                contacts.push(Contact {
                    id: child.id.clone(),
                    name: child.display_name().to_string(),
                    role: self.role_name(&child.role_id),
                });
            }
        }

        if agent_id == ROOT_AGENT_ID {
            contacts.push(Contact {
                id: USER_AGENT_ID.to_string(),
                name: "user".to_string(),
                role: "human".to_string(),
            });
        }

        contacts
    }

    fn role_name(&self, role_id: &str) -> String {
        self.org
            .get_role(role_id)
            .map(|r| r.name)
            .unwrap_or_else(|| role_id.to_string())
    }

    /// Synthesize a `status_report` to the parent (or the user, for
    /// root) about an unrecoverable failure. Best-effort.
    fn notify_parent(
        &self,
        agent_id: &str,
        record: &AgentRecord,
        task_id: Option<&str>,
        code: &str,
        message: &str,
    ) {
        let recipient = record
            .parent_id
            .clone()
            .unwrap_or_else(|| USER_AGENT_ID.to_string());

        let mut payload = Payload::text(format!("Agent {agent_id} halted: {message}"));
        payload
            .extra
            .insert("status".into(), Value::String("error".into()));
        payload
            .extra
            .insert("error".into(), Value::String(code.to_string()));

        let result = self.bus.send(SendMessage {
            from: agent_id.to_string(),
            to: recipient.clone(),
            payload,
            task_id: task_id.map(String::from),
            deliver_at: None,
            message_type: Some(MessageType::StatusReport),
        });
        if let Err(e) = result {
            warn!(agent = %agent_id, to = %recipient, error = %e, "failed to notify parent");
        }
    }
}

/// Serialize a tool result, bounded to [`MAX_TOOL_RESULT_BYTES`].
fn truncate_result(result: &Value) -> String {
    let mut text = result.to_string();
    if text.len() > MAX_TOOL_RESULT_BYTES {
        let mut cut = MAX_TOOL_RESULT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("… [truncated]");
    }
    text
}
