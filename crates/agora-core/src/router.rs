//! Capability-aware content routing.
//!
//! Converts an artifact reference into the content part an outbound LLM
//! message should carry, given the current service's declared input
//! capabilities:
//!
//! * text/JSON artifacts are emitted as text unchanged;
//! * a binary artifact whose modality the service supports becomes the
//!   matching structured part (`image_url` with a base64 data URL for
//!   images, a `file` part for everything else);
//! * a binary artifact the service cannot ingest degrades to a short
//!   textual description. The raw bytes never appear in a text field.

use std::sync::Arc;

use base64::Engine;
use tracing::debug;

use agora_llm::types::{ContentPart, FileData};
use agora_types::service::{Capability, ServiceConfig};

use crate::artifact::{Artifact, ArtifactContent, ArtifactError, ArtifactStore};

/// How an artifact was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Emitted as plain text (native text or degraded description).
    Text,
    /// Emitted as an `image_url` part.
    Image,
    /// Emitted as a `file` part.
    File,
}

impl Routing {
    /// Wire label used in tool results.
    pub fn label(self) -> &'static str {
        match self {
            Routing::Text => "text",
            Routing::Image => "image",
            Routing::File => "file",
        }
    }
}

/// A routed artifact: the part to send plus how it was routed.
#[derive(Debug, Clone)]
pub struct RoutedContent {
    /// The content part to place in the outbound message.
    pub part: ContentPart,
    /// Which route was taken.
    pub routing: Routing,
}

/// Maps artifacts to content parts based on service capabilities.
pub struct ContentRouter {
    store: Arc<ArtifactStore>,
}

impl ContentRouter {
    /// Create a router over the given artifact store.
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }

    /// The artifact store this router reads from.
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Resolve and route an artifact reference for `service`.
    pub fn route_ref(
        &self,
        reference: &str,
        service: &ServiceConfig,
    ) -> Result<RoutedContent, ArtifactError> {
        let artifact = self.store.get(reference)?;
        Ok(self.route(&artifact, service))
    }

    /// Route an already-loaded artifact for `service`.
    pub fn route(&self, artifact: &Artifact, service: &ServiceConfig) -> RoutedContent {
        match &artifact.content {
            ArtifactContent::Text(text) => RoutedContent {
                part: ContentPart::text(text.clone()),
                routing: Routing::Text,
            },
            ArtifactContent::Json(value) => RoutedContent {
                part: ContentPart::text(
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
                ),
                routing: Routing::Text,
            },
            ArtifactContent::Binary(bytes) => self.route_binary(artifact, bytes, service),
        }
    }

    fn route_binary(
        &self,
        artifact: &Artifact,
        bytes: &[u8],
        service: &ServiceConfig,
    ) -> RoutedContent {
        let mime = artifact
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let capability = Capability::for_mime(mime);

        if service.supports(capability) {
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            let data_url = format!("data:{mime};base64,{encoded}");
            debug!(
                artifact = %artifact.id,
                mime = %mime,
                capability = ?capability,
                "routing binary artifact as structured part"
            );
            if capability == Capability::Vision {
                RoutedContent {
                    part: ContentPart::image_url(data_url),
                    routing: Routing::Image,
                }
            } else {
                RoutedContent {
                    part: ContentPart::File {
                        file: FileData {
                            filename: artifact.filename(),
                            file_data: data_url,
                        },
                    },
                    routing: Routing::File,
                }
            }
        } else {
            debug!(
                artifact = %artifact.id,
                mime = %mime,
                capability = ?capability,
                "service lacks capability, degrading to description"
            );
            RoutedContent {
                part: ContentPart::text(unreadable_description(artifact, capability)),
                routing: Routing::Text,
            }
        }
    }
}

/// The degraded description for an artifact the model cannot ingest.
fn unreadable_description(artifact: &Artifact, capability: Capability) -> String {
    format!(
        "[Cannot read] {} (artifact:{})\nType: {}\nCurrent model does not \
         support this type. Consider an agent with that capability.",
        artifact.filename(),
        artifact.id,
        capability.friendly_name()
    )
}
