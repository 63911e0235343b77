//! The `send_message` tool: enqueue a message to another agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agora_core::bus::{BusError, MessageBus, SendMessage};
use agora_core::tools::registry::{required_str, Tool, ToolContext, ToolError};
use agora_types::message::{parse_quick_replies, Attachment, MessageType, Payload};

/// Send a message through the bus to a named recipient.
pub struct SendMessageTool {
    bus: Arc<MessageBus>,
}

impl SendMessageTool {
    /// Create the tool over the message bus.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

fn map_bus_error(err: BusError) -> ToolError {
    match err {
        BusError::UnknownRecipient(to) => ToolError::UnknownRecipient(to),
        BusError::InvalidRoute(msg) => ToolError::InvalidRoute(msg),
        BusError::Payload(e) => ToolError::Payload(e),
        other => ToolError::ExecutionFailed(other.to_string()),
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to another agent (or to 'user'). Supports quick replies and artifact attachments."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Recipient agent id" },
                "payload": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Message text" },
                        "quickReplies": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Up to 10 suggested replies"
                        },
                        "attachments": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "type": { "type": "string" },
                                    "artifactRef": { "type": "string" },
                                    "filename": { "type": "string" }
                                },
                                "required": ["type", "artifactRef"]
                            }
                        }
                    },
                    "required": ["text"]
                },
                "messageType": {
                    "type": "string",
                    "description": "Optional typed category (task_assignment, status_report, ...)"
                }
            },
            "required": ["to", "payload"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let to = required_str(&args, "to")?;
        let payload_value = args
            .get("payload")
            .ok_or_else(|| ToolError::MissingParameter("missing required field: payload".into()))?;
        let text = required_str(payload_value, "text")?;

        let quick_replies = match payload_value.get("quickReplies") {
            Some(value) => Some(parse_quick_replies(value)?),
            None => None,
        };

        let attachments: Vec<Attachment> = match payload_value.get("attachments") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ToolError::MissingParameter(format!("invalid attachments: {e}")))?,
            None => Vec::new(),
        };

        let message_type: Option<MessageType> = match args.get("messageType") {
            Some(Value::String(s)) => Some(
                serde_json::from_value(Value::String(s.clone())).map_err(|_| {
                    ToolError::MissingParameter(format!("unknown messageType: {s}"))
                })?,
            ),
            _ => None,
        };

        let mut payload = Payload::text(text);
        payload.quick_replies = quick_replies;
        payload.attachments = attachments;
        if let Some(extra) = payload_value.as_object() {
            for (key, value) in extra {
                if !matches!(key.as_str(), "text" | "quickReplies" | "attachments") {
                    payload.extra.insert(key.clone(), value.clone());
                }
            }
        }

        let message_id = self
            .bus
            .send(SendMessage {
                from: ctx.agent_id.clone(),
                to: to.clone(),
                payload,
                task_id: ctx.task_id.clone(),
                deliver_at: None,
                message_type,
            })
            .map_err(map_bus_error)?;

        debug!(from = %ctx.agent_id, to = %to, id = %message_id, "message sent via tool");
        Ok(json!({ "messageId": message_id.to_string() }))
    }
}
