//! LLM service descriptors and input-modality capabilities.
//!
//! A [`ServiceConfig`] names one OpenAI-compatible chat completion
//! endpoint together with the model to use and the input modalities the
//! model accepts. The content router consults the capability set when
//! deciding whether a binary artifact can be sent as a structured part
//! or must degrade to a textual description.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// An input modality a service declares supporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Plain text (every service supports this).
    Text,
    /// Images (`image/*`).
    Vision,
    /// Audio (`audio/*`).
    Audio,
    /// Documents and other binary files.
    File,
    /// Video (`video/*`).
    Video,
}

impl Capability {
    /// The capability required to ingest content of the given MIME type.
    ///
    /// `image/* -> Vision`, `audio/* -> Audio`, `video/* -> Video`,
    /// `text/* -> Text`, anything else -> `File`.
    pub fn for_mime(mime: &str) -> Capability {
        let major = mime.split('/').next().unwrap_or("");
        match major {
            "image" => Capability::Vision,
            "audio" => Capability::Audio,
            "video" => Capability::Video,
            "text" => Capability::Text,
            _ => Capability::File,
        }
    }

    /// Human-friendly label used in degraded textual descriptions.
    pub fn friendly_name(self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Vision => "image",
            Capability::Audio => "audio",
            Capability::File => "document",
            Capability::Video => "video",
        }
    }
}

/// Configuration for one chat-completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unique service id referenced by roles (`preferred_service`).
    pub id: String,

    /// Base URL of the OpenAI-compatible endpoint
    /// (e.g. `https://api.openai.com/v1`).
    pub base_url: String,

    /// Model identifier sent in requests.
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Input modalities the model accepts. Text is implied.
    #[serde(default)]
    pub capabilities: HashSet<Capability>,

    /// Context window size in tokens, used for conversation budgeting.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Maximum completion tokens per request, if capped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_api_key_env() -> String {
    "AGORA_API_KEY".into()
}

fn default_context_window() -> usize {
    128_000
}

impl ServiceConfig {
    /// Create a minimal text-only service config.
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key_env: default_api_key_env(),
            headers: HashMap::new(),
            capabilities: HashSet::new(),
            context_window: default_context_window(),
            max_tokens: None,
        }
    }

    /// Whether the service accepts the given input modality.
    /// Text is always accepted.
    pub fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Text || self.capabilities.contains(&capability)
    }
}
