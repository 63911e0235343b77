//! Request and response types for chat completion calls.
//!
//! These mirror the OpenAI chat completion API format, which every
//! service agora talks to is assumed to accept. Message content is
//! either a plain string or a list of typed parts (text, image, file)
//! so the content router can attach multimodal artifacts.

use serde::{Deserialize, Serialize};

/// Content of a chat message: plain text or multimodal parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Structured content parts (text, image_url, file).
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to displayable text. Non-text parts are represented by
    /// their placeholder descriptions.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    match part {
                        ContentPart::Text { text } => out.push(text.clone()),
                        ContentPart::ImageUrl { .. } => out.push("[image]".into()),
                        ContentPart::File { file } => {
                            out.push(format!("[file: {}]", file.filename));
                        }
                    }
                }
                out.join("\n")
            }
        }
    }

    /// Rough character length for token estimation.
    pub fn approx_len(&self) -> usize {
        match self {
            MessageContent::Text(s) => s.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ImageUrl { image_url } => image_url.url.len(),
                    ContentPart::File { file } => file.file_data.len(),
                })
                .sum(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// One typed content part inside a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },
    /// An image, usually a `data:<mime>;base64,<payload>` URL.
    ImageUrl { image_url: ImageUrl },
    /// An attached document.
    File { file: FileData },
}

impl ContentPart {
    /// Text part constructor.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Image part constructor from a (data) URL.
    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Image reference inside an `image_url` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// HTTP or `data:` URL of the image.
    pub url: String,
}

/// Document payload inside a `file` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    /// Original filename.
    pub filename: String,
    /// Base64-encoded file content (data URL form).
    pub file_data: String,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the author: "system", "user", "assistant", or "tool".
    pub role: String,

    /// Message content.
    pub content: MessageContent,

    /// For tool-result messages, the ID of the tool call answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Tool name, set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Create a message with a role and plain text content.
    pub fn new(role: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            name: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new("assistant", content)
    }

    /// Create a tool-result message answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<MessageContent>,
    ) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
            name: Some(name.into()),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,

    /// The type of tool call. Currently always "function".
    #[serde(rename = "type")]
    pub call_type: String,

    /// The function to invoke.
    pub function: FunctionCall,
}

/// A function invocation within a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// The name of the function to call.
    pub name: String,

    /// The arguments as a JSON string.
    pub arguments: String,
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,

    /// Conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Tool definitions available to the model (OpenAI function format).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,

    /// Tool-choice directive ("auto", "none", or a specific function).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

impl ChatRequest {
    /// Create a minimal request with a model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

/// A chat completion response (OpenAI format).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,

    /// The list of completion choices.
    pub choices: Vec<Choice>,

    /// Token usage statistics, if the provider reports them.
    #[serde(default)]
    pub usage: Option<Usage>,

    /// The model that generated the response.
    #[serde(default)]
    pub model: String,
}

/// A single completion choice within a response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    /// Index of this choice.
    #[serde(default)]
    pub index: i32,

    /// The assistant's response message.
    pub message: ChatMessage,

    /// Why generation stopped ("stop", "tool_calls", "length").
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a completion request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: i64,

    /// Tokens in the generated completion.
    pub completion_tokens: i64,

    /// Total tokens used.
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_helpers() {
        let sys = ChatMessage::system("You are root.");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.content.as_text(), "You are root.");

        let tool = ChatMessage::tool_result("call_1", "send_message", "{\"ok\":true}");
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool.name.as_deref(), Some("send_message"));
    }

    #[test]
    fn text_content_serializes_as_plain_string() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""content":"hello""#));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn parts_content_serializes_as_array() {
        let msg = ChatMessage::user(MessageContent::Parts(vec![
            ContentPart::text("see attached"),
            ContentPart::image_url("data:image/png;base64,AAAA"),
        ]));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"text""#));
        assert!(json.contains(r#""type":"image_url""#));

        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn content_as_text_flattens_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("caption"),
            ContentPart::image_url("data:image/png;base64,AAAA"),
            ContentPart::File {
                file: FileData {
                    filename: "report.pdf".into(),
                    file_data: "data:application/pdf;base64,BBBB".into(),
                },
            },
        ]);
        let text = content.as_text();
        assert!(text.contains("caption"));
        assert!(text.contains("[image]"));
        assert!(text.contains("[file: report.pdf]"));
    }

    #[test]
    fn tool_call_type_field_renamed() {
        let tc = ToolCall {
            id: "tc1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "spawn_agent_with_task".into(),
                arguments: "{}".into(),
            },
        };
        let json = serde_json::to_string(&tc).unwrap();
        assert!(json.contains(r#""type":"function""#));
        assert!(!json.contains("call_type"));
    }

    #[test]
    fn chat_request_omits_empty_optionals() {
        let req = ChatRequest::new("test-model", vec![ChatMessage::user("hi")]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tools"));
        assert!(!json.contains("tool_choice"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn chat_response_deserializes() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Done."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15},
            "model": "test-model"
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].message.content.as_text(), "Done.");
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn chat_response_with_tool_calls_deserializes() {
        let json = r#"{
            "id": "chatcmpl-2",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "put_artifact", "arguments": "{\"type\":\"text/plain\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "model": "test-model"
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let calls = resp.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "put_artifact");
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }
}
