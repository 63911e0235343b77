//! Message envelope and payload types for inter-agent communication.
//!
//! An [`Envelope`] is the unit the message bus routes: sender, recipient,
//! a structured [`Payload`], an optional correlation task id, and an
//! optional future delivery time. Payloads carry free-form fields plus a
//! few conventional ones (`text`, `quick_replies`, `attachments`).
//!
//! When an envelope declares a [`MessageType`], the payload is validated
//! against that type's expectations before it is accepted onto the bus.
//! Validators are total functions: they never panic and report every
//! failure as a [`PayloadError`] carrying a stable error code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum number of quick replies a payload may carry.
pub const MAX_QUICK_REPLIES: usize = 10;

/// An attachment reference inside a payload.
///
/// Attachments never embed content directly; they point at an artifact
/// in the artifact store via an opaque `artifact:<uuid>` reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment kind hint (e.g. `"image"`, `"file"`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque artifact reference of the form `artifact:<uuid>`.
    #[serde(rename = "artifactRef")]
    pub artifact_ref: String,

    /// Original filename, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Typed message categories exchanged between agents.
///
/// Serialized in snake_case (`"task_assignment"`, `"status_report"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A parent hands work to a child.
    TaskAssignment,
    /// An agent asks to be introduced to a peer.
    IntroductionRequest,
    /// Reply to an introduction request, naming the contact.
    IntroductionResponse,
    /// An agent requests help from a peer.
    CollaborationRequest,
    /// Accept/decline reply to a collaboration request.
    CollaborationResponse,
    /// Progress or completion report to a parent.
    StatusReport,
    /// Untyped conversational message.
    General,
}

/// Structured message payload.
///
/// The conventional fields are explicit; anything type-specific lands in
/// `extra` (flattened on the wire so payloads stay plain JSON objects).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Main text content.
    #[serde(default)]
    pub text: String,

    /// Optional quick-reply suggestions shown to the recipient.
    /// At most [`MAX_QUICK_REPLIES`] non-empty strings.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "quickReplies")]
    pub quick_replies: Option<Vec<String>>,

    /// Artifact references attached to this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Type-specific fields, flattened into the payload object.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Payload {
    /// Create a plain text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Validate the payload's conventional fields.
    ///
    /// Checks quick replies against the count/type/emptiness rules. This
    /// is always run on send, regardless of message type.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if let Some(ref replies) = self.quick_replies {
            validate_quick_replies(replies)?;
        }
        Ok(())
    }

    /// Validate the payload against a typed message schema.
    ///
    /// Runs [`validate`](Self::validate) first, then the per-type checks:
    ///
    /// * `task_assignment`, `collaboration_request`, `introduction_request`,
    ///   `general` -- require non-empty `text`
    /// * `introduction_response` -- requires a string `contact_id` field
    /// * `collaboration_response` -- requires a boolean `accepted` field
    /// * `status_report` -- requires a string `status` field
    pub fn validate_typed(&self, message_type: MessageType) -> Result<(), PayloadError> {
        self.validate()?;
        match message_type {
            MessageType::TaskAssignment
            | MessageType::CollaborationRequest
            | MessageType::IntroductionRequest
            | MessageType::General => {
                if self.text.trim().is_empty() {
                    return Err(PayloadError::MissingField {
                        message_type,
                        field: "text",
                    });
                }
            }
            MessageType::IntroductionResponse => {
                self.require_string_field(message_type, "contact_id")?;
            }
            MessageType::CollaborationResponse => {
                match self.extra.get("accepted") {
                    Some(Value::Bool(_)) => {}
                    Some(_) => {
                        return Err(PayloadError::InvalidField {
                            message_type,
                            field: "accepted",
                            expected: "boolean",
                        });
                    }
                    None => {
                        return Err(PayloadError::MissingField {
                            message_type,
                            field: "accepted",
                        });
                    }
                }
            }
            MessageType::StatusReport => {
                self.require_string_field(message_type, "status")?;
            }
        }
        Ok(())
    }

    fn require_string_field(
        &self,
        message_type: MessageType,
        field: &'static str,
    ) -> Result<(), PayloadError> {
        match self.extra.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(()),
            Some(_) => Err(PayloadError::InvalidField {
                message_type,
                field,
                expected: "non-empty string",
            }),
            None => Err(PayloadError::MissingField {
                message_type,
                field,
            }),
        }
    }
}

/// Validate a quick-reply list against the payload rules.
///
/// At most [`MAX_QUICK_REPLIES`] entries, every entry a non-empty string.
pub fn validate_quick_replies(replies: &[String]) -> Result<(), PayloadError> {
    if replies.len() > MAX_QUICK_REPLIES {
        return Err(PayloadError::TooManyQuickReplies {
            count: replies.len(),
        });
    }
    for reply in replies {
        if reply.is_empty() {
            return Err(PayloadError::EmptyQuickReply);
        }
    }
    Ok(())
}

/// Parse and validate quick replies from a raw JSON value.
///
/// Tool arguments arrive as untyped JSON, so the non-array and
/// non-string-element failure modes exist only on this path.
pub fn parse_quick_replies(value: &Value) -> Result<Vec<String>, PayloadError> {
    let array = value
        .as_array()
        .ok_or(PayloadError::QuickRepliesNotArray)?;
    let mut replies = Vec::with_capacity(array.len());
    for entry in array {
        match entry {
            Value::String(s) => replies.push(s.clone()),
            _ => return Err(PayloadError::QuickReplyNotString),
        }
    }
    validate_quick_replies(&replies)?;
    Ok(replies)
}

/// Validation failure for a [`Payload`].
///
/// Every variant maps to one of the stable error codes of the runtime's
/// error taxonomy via [`code`](Self::code).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum PayloadError {
    /// More than [`MAX_QUICK_REPLIES`] quick replies.
    #[error("too many quick replies: {count} (max {MAX_QUICK_REPLIES})")]
    TooManyQuickReplies { count: usize },

    /// `quickReplies` was not a JSON array.
    #[error("quickReplies must be an array of strings")]
    QuickRepliesNotArray,

    /// A quick-reply element was not a string.
    #[error("quickReplies entries must be strings")]
    QuickReplyNotString,

    /// A quick-reply element was an empty string.
    #[error("quickReplies entries must be non-empty")]
    EmptyQuickReply,

    /// A typed payload is missing a required field.
    #[error("payload for {message_type:?} is missing required field '{field}'")]
    MissingField {
        message_type: MessageType,
        field: &'static str,
    },

    /// A typed payload field has the wrong shape.
    #[error("payload field '{field}' for {message_type:?} must be a {expected}")]
    InvalidField {
        message_type: MessageType,
        field: &'static str,
        expected: &'static str,
    },
}

impl PayloadError {
    /// Stable error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            PayloadError::TooManyQuickReplies { .. } => "quickReplies_too_many",
            PayloadError::QuickRepliesNotArray | PayloadError::QuickReplyNotString => {
                "quickReplies_invalid_type"
            }
            PayloadError::EmptyQuickReply => "quickReplies_empty_string",
            PayloadError::MissingField { .. } | PayloadError::InvalidField { .. } => {
                "missing_parameter"
            }
        }
    }
}

/// A bus envelope: one routed message between two agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message identifier.
    pub id: Uuid,

    /// Sender agent id.
    pub from: String,

    /// Recipient agent id.
    pub to: String,

    /// Structured payload.
    pub payload: Payload,

    /// Correlation id of the root task this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "taskId")]
    pub task_id: Option<String>,

    /// Creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Optional future delivery time. Never earlier than `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "deliverAt")]
    pub deliver_at: Option<DateTime<Utc>>,

    /// Optional typed category; when set, the payload was validated
    /// against that type's schema at send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

impl Envelope {
    /// Create a new envelope with a fresh id and the current timestamp.
    pub fn new(from: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            payload,
            task_id: None,
            created_at: Utc::now(),
            deliver_at: None,
            message_type: None,
        }
    }

    /// Attach a task correlation id.
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Schedule delivery for a future time. Times in the past are clamped
    /// to `created_at` so the `deliver_at >= created_at` invariant holds.
    pub fn with_deliver_at(mut self, deliver_at: DateTime<Utc>) -> Self {
        self.deliver_at = Some(deliver_at.max(self.created_at));
        self
    }

    /// Tag the envelope with a typed message category.
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Whether this envelope may be delivered at `now`.
    pub fn is_deliverable(&self, now: DateTime<Utc>) -> bool {
        match self.deliver_at {
            Some(at) => at <= now,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn payload_text_constructor() {
        let p = Payload::text("hello");
        assert_eq!(p.text, "hello");
        assert!(p.quick_replies.is_none());
        assert!(p.attachments.is_empty());
        assert!(p.extra.is_empty());
    }

    #[test]
    fn payload_serde_roundtrip_with_extra() {
        let mut p = Payload::text("choose");
        p.quick_replies = Some(vec!["yes".into(), "no".into()]);
        p.extra
            .insert("status".into(), Value::String("done".into()));

        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("quickReplies"));
        assert!(json.contains(r#""status":"done""#));

        let restored: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, p);
    }

    #[test]
    fn quick_replies_at_limit_ok() {
        let replies: Vec<String> = (0..MAX_QUICK_REPLIES).map(|i| format!("r{i}")).collect();
        assert!(validate_quick_replies(&replies).is_ok());
    }

    #[test]
    fn quick_replies_over_limit_rejected() {
        let replies: Vec<String> = (0..=MAX_QUICK_REPLIES).map(|i| format!("r{i}")).collect();
        let err = validate_quick_replies(&replies).unwrap_err();
        assert_eq!(err.code(), "quickReplies_too_many");
    }

    #[test]
    fn quick_replies_empty_string_rejected() {
        let replies = vec!["ok".to_string(), String::new()];
        let err = validate_quick_replies(&replies).unwrap_err();
        assert_eq!(err.code(), "quickReplies_empty_string");
    }

    #[test]
    fn parse_quick_replies_rejects_non_array() {
        let err = parse_quick_replies(&Value::String("yes".into())).unwrap_err();
        assert_eq!(err.code(), "quickReplies_invalid_type");
    }

    #[test]
    fn parse_quick_replies_rejects_non_string_element() {
        let err = parse_quick_replies(&serde_json::json!(["yes", 42])).unwrap_err();
        assert_eq!(err.code(), "quickReplies_invalid_type");
    }

    #[test]
    fn parse_quick_replies_accepts_valid_list() {
        let replies = parse_quick_replies(&serde_json::json!(["yes", "no"])).unwrap();
        assert_eq!(replies, vec!["yes", "no"]);
    }

    #[test]
    fn typed_validation_task_assignment_requires_text() {
        let p = Payload::default();
        let err = p.validate_typed(MessageType::TaskAssignment).unwrap_err();
        assert!(matches!(err, PayloadError::MissingField { field: "text", .. }));

        let p = Payload::text("do the thing");
        assert!(p.validate_typed(MessageType::TaskAssignment).is_ok());
    }

    #[test]
    fn typed_validation_status_report_requires_status() {
        let p = Payload::text("progress");
        let err = p.validate_typed(MessageType::StatusReport).unwrap_err();
        assert!(matches!(err, PayloadError::MissingField { field: "status", .. }));

        let mut p = Payload::text("progress");
        p.extra
            .insert("status".into(), Value::String("in_progress".into()));
        assert!(p.validate_typed(MessageType::StatusReport).is_ok());
    }

    #[test]
    fn typed_validation_collaboration_response_requires_bool() {
        let mut p = Payload::text("sure");
        p.extra.insert("accepted".into(), Value::String("yes".into()));
        let err = p
            .validate_typed(MessageType::CollaborationResponse)
            .unwrap_err();
        assert!(matches!(err, PayloadError::InvalidField { field: "accepted", .. }));

        let mut p = Payload::text("sure");
        p.extra.insert("accepted".into(), Value::Bool(true));
        assert!(p.validate_typed(MessageType::CollaborationResponse).is_ok());
    }

    #[test]
    fn envelope_deliver_at_clamped_to_created_at() {
        let env = Envelope::new("a", "b", Payload::text("hi"));
        let past = env.created_at - Duration::seconds(30);
        let env = env.with_deliver_at(past);
        assert_eq!(env.deliver_at.unwrap(), env.created_at);
    }

    #[test]
    fn envelope_deliverable_respects_deliver_at() {
        let env = Envelope::new("a", "b", Payload::text("hi"));
        let now = env.created_at;
        assert!(env.is_deliverable(now));

        let later = now + Duration::seconds(60);
        let env = env.with_deliver_at(later);
        assert!(!env.is_deliverable(now));
        assert!(env.is_deliverable(later));
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let env = Envelope::new("root", "worker-1", Payload::text("begin"))
            .with_task_id("task-9")
            .with_message_type(MessageType::TaskAssignment);
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""taskId":"task-9""#));
        assert!(json.contains(r#""message_type":"task_assignment""#));

        let restored: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, env.id);
        assert_eq!(restored.from, "root");
        assert_eq!(restored.to, "worker-1");
        assert_eq!(restored.message_type, Some(MessageType::TaskAssignment));
    }

    #[test]
    fn message_type_snake_case_wire_format() {
        let json = serde_json::to_string(&MessageType::IntroductionRequest).unwrap();
        assert_eq!(json, "\"introduction_request\"");
        let parsed: MessageType = serde_json::from_str("\"status_report\"").unwrap();
        assert_eq!(parsed, MessageType::StatusReport);
    }
}
