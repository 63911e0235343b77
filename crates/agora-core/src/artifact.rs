//! Content-addressed artifact store.
//!
//! Artifacts are immutable objects referenced by opaque strings of the
//! form `artifact:<uuid>`. Each artifact is one data file plus one
//! `.meta` JSON sidecar under a single directory:
//!
//! ```text
//! artifacts/<uuid>.<ext>    data (JSON, text, or raw bytes)
//! artifacts/<uuid>.meta     sidecar with type, filename, mime, flags
//! ```
//!
//! Both files are written atomically (temp + rename). Binary input is
//! classified by a signature/heuristic sniff; the store records the
//! resulting `is_binary` flag and MIME type so the content router can
//! decide how to present the artifact to a model.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Prefix of every artifact reference.
pub const REF_PREFIX: &str = "artifact:";

/// Content handed to [`ArtifactStore::put`].
#[derive(Debug, Clone)]
pub enum PutContent {
    /// Structured JSON content, stored pretty-printed.
    Json(Value),
    /// Plain text content.
    Text(String),
    /// Raw bytes; classified binary-vs-text on write.
    Bytes(Vec<u8>),
}

/// Content returned from [`ArtifactStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    /// Parsed structured content.
    Json(Value),
    /// Text content.
    Text(String),
    /// Raw bytes for binary artifacts.
    Binary(Vec<u8>),
}

impl ArtifactContent {
    /// Text view of the content, for routing and logging.
    /// Binary content has no text view.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ArtifactContent::Json(v) => Some(serde_json::to_string_pretty(v).unwrap_or_default()),
            ArtifactContent::Text(s) => Some(s.clone()),
            ArtifactContent::Binary(_) => None,
        }
    }
}

/// A stored artifact with its metadata.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Artifact id (the uuid inside the reference).
    pub id: String,
    /// Declared type (e.g. `"json"`, `"text/plain"`, `"image/png"`).
    pub artifact_type: String,
    /// The content.
    pub content: ArtifactContent,
    /// Arbitrary metadata (filename, mimeType, size, ...).
    pub meta: serde_json::Map<String, Value>,
    /// Whether the data file holds raw binary bytes.
    pub is_binary: bool,
    /// Detected or declared MIME type.
    pub mime_type: Option<String>,
    /// Producer message id, if recorded.
    pub message_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// The full `artifact:<uuid>` reference for this artifact.
    pub fn reference(&self) -> String {
        format!("{REF_PREFIX}{}", self.id)
    }

    /// Filename from metadata, falling back to `<id>.<ext-ish>`.
    pub fn filename(&self) -> String {
        self.meta
            .get("filename")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Sidecar format persisted next to each data file.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    id: String,
    #[serde(rename = "type")]
    artifact_type: String,
    #[serde(default)]
    meta: serde_json::Map<String, Value>,
    #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "isBinary")]
    is_binary: bool,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    /// Name of the data file next to this sidecar.
    #[serde(rename = "dataFile")]
    data_file: String,
}

/// Failures from artifact store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ArtifactError {
    /// The reference does not name a stored artifact (or its sidecar
    /// is missing).
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// The reference string is malformed.
    #[error("invalid artifact reference: {0}")]
    InvalidRef(String),

    /// Storage I/O failure.
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    /// Sidecar (de)serialization failure.
    #[error("artifact meta error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Content-addressed store for produced artifacts.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The store's root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store an artifact and return its `artifact:<uuid>` reference.
    ///
    /// `artifact_type` is the caller-declared type; for byte content the
    /// binary flag and MIME type are detected from the data itself when
    /// the declared type is not specific enough.
    pub fn put(
        &self,
        artifact_type: &str,
        content: PutContent,
        mut meta: serde_json::Map<String, Value>,
        message_id: Option<String>,
    ) -> Result<String, ArtifactError> {
        let id = Uuid::new_v4().to_string();

        let (bytes, is_binary, mime_type) = match content {
            PutContent::Json(value) => {
                let text = serde_json::to_string_pretty(&value)?;
                (text.into_bytes(), false, mime_for_type(artifact_type))
            }
            PutContent::Text(text) => (text.into_bytes(), false, mime_for_type(artifact_type)),
            PutContent::Bytes(bytes) => {
                let declared = mime_for_type(artifact_type);
                let sniffed = sniff_mime(&bytes);
                let binary = is_binary_data(&bytes);
                // A concrete sniffed type beats a vague declared one.
                let mime = match (&declared, sniffed) {
                    (Some(d), _) if d != "application/octet-stream" => Some(d.clone()),
                    (_, Some(s)) => Some(s.to_string()),
                    (d, None) => d.clone(),
                };
                (bytes, binary, mime)
            }
        };

        let ext = extension_for(artifact_type, mime_type.as_deref(), is_binary);
        let data_file = format!("{id}.{ext}");

        meta.entry("size".to_string())
            .or_insert_with(|| Value::from(bytes.len() as u64));
        if let Some(ref mime) = mime_type {
            meta.entry("mimeType".to_string())
                .or_insert_with(|| Value::String(mime.clone()));
        }

        let sidecar = Sidecar {
            id: id.clone(),
            artifact_type: artifact_type.to_string(),
            meta,
            message_id,
            created_at: Utc::now(),
            is_binary,
            mime_type,
            data_file: data_file.clone(),
        };

        write_atomic(&self.dir.join(&data_file), &bytes)?;
        write_atomic(
            &self.dir.join(format!("{id}.meta")),
            serde_json::to_string_pretty(&sidecar)?.as_bytes(),
        )?;

        debug!(artifact = %id, kind = %artifact_type, bytes = bytes.len(), "stored artifact");
        Ok(format!("{REF_PREFIX}{id}"))
    }

    /// Store an uploaded file, preserving its original filename and
    /// resolving a generic MIME type to a specific one from the
    /// extension.
    pub fn save_uploaded_file(
        &self,
        bytes: Vec<u8>,
        artifact_type: &str,
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<(String, serde_json::Map<String, Value>), ArtifactError> {
        let resolved_mime = match mime_type {
            Some(m) if m != "application/octet-stream" => Some(m.to_string()),
            _ => mime_from_extension(filename)
                .map(String::from)
                .or_else(|| mime_type.map(String::from)),
        };

        let mut meta = serde_json::Map::new();
        meta.insert("filename".into(), Value::String(filename.to_string()));
        if let Some(ref mime) = resolved_mime {
            meta.insert("mimeType".into(), Value::String(mime.clone()));
        }

        let declared_type = resolved_mime.as_deref().unwrap_or(artifact_type).to_string();
        let reference = self.put(&declared_type, PutContent::Bytes(bytes), meta.clone(), None)?;
        Ok((reference, meta))
    }

    /// Fetch an artifact by reference. A missing sidecar is treated as
    /// artifact-not-found even if a data file exists.
    pub fn get(&self, reference: &str) -> Result<Artifact, ArtifactError> {
        let id = parse_ref(reference)?;
        let meta_path = self.dir.join(format!("{id}.meta"));
        if !meta_path.is_file() {
            return Err(ArtifactError::NotFound(reference.to_string()));
        }

        let sidecar: Sidecar = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
        let data_path = self.dir.join(&sidecar.data_file);
        let bytes = std::fs::read(&data_path)
            .map_err(|_| ArtifactError::NotFound(reference.to_string()))?;

        let content = if sidecar.is_binary {
            ArtifactContent::Binary(bytes)
        } else {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if sidecar.artifact_type == "json"
                || sidecar.artifact_type == "application/json"
                || sidecar.data_file.ends_with(".json")
            {
                match serde_json::from_str(&text) {
                    Ok(value) => ArtifactContent::Json(value),
                    Err(_) => ArtifactContent::Text(text),
                }
            } else {
                ArtifactContent::Text(text)
            }
        };

        Ok(Artifact {
            id: sidecar.id,
            artifact_type: sidecar.artifact_type,
            content,
            meta: sidecar.meta,
            is_binary: sidecar.is_binary,
            mime_type: sidecar.mime_type,
            message_id: sidecar.message_id,
            created_at: sidecar.created_at,
        })
    }

    /// Whether a reference names a stored artifact.
    pub fn exists(&self, reference: &str) -> bool {
        parse_ref(reference)
            .map(|id| self.dir.join(format!("{id}.meta")).is_file())
            .unwrap_or(false)
    }
}

/// Parse `artifact:<uuid>` (or a bare uuid) into the uuid part.
fn parse_ref(reference: &str) -> Result<&str, ArtifactError> {
    let id = reference.strip_prefix(REF_PREFIX).unwrap_or(reference);
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(ArtifactError::InvalidRef(reference.to_string()));
    }
    Ok(id)
}

/// Write a file atomically: temp file in the same directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Normalize a declared artifact type to a MIME type, when it is one.
fn mime_for_type(artifact_type: &str) -> Option<String> {
    if artifact_type.contains('/') {
        Some(artifact_type.to_string())
    } else if artifact_type == "json" {
        Some("application/json".to_string())
    } else if artifact_type == "text" {
        Some("text/plain".to_string())
    } else {
        None
    }
}

/// Sniff well-known binary signatures.
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if bytes.starts_with(b"PK\x03\x04") {
        Some("application/zip")
    } else if bytes.len() > 11 && &bytes[4..12] == b"ftypmp42" {
        Some("video/mp4")
    } else if bytes.starts_with(b"RIFF") && bytes.len() > 11 && &bytes[8..12] == b"WAVE" {
        Some("audio/wav")
    } else {
        None
    }
}

/// Heuristic binary check: known signature, NUL byte, or a high share
/// of non-printable bytes in the head of the data.
fn is_binary_data(bytes: &[u8]) -> bool {
    if sniff_mime(bytes).is_some() {
        return true;
    }
    let head = &bytes[..bytes.len().min(1024)];
    if head.contains(&0) {
        return true;
    }
    if head.is_empty() {
        return false;
    }
    let non_text = head
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20))
        .count();
    non_text * 10 > head.len()
}

/// Pick a file extension from the type/MIME information.
fn extension_for(artifact_type: &str, mime: Option<&str>, is_binary: bool) -> &'static str {
    match mime {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/gif") => "gif",
        Some("application/pdf") => "pdf",
        Some("application/zip") => "zip",
        Some("application/json") => "json",
        Some("text/plain") => "txt",
        Some("text/markdown") => "md",
        Some("text/html") => "html",
        Some("text/csv") => "csv",
        Some("audio/wav") => "wav",
        Some("audio/mpeg") => "mp3",
        Some("video/mp4") => "mp4",
        _ => {
            if artifact_type == "json" {
                "json"
            } else if is_binary {
                "bin"
            } else {
                "txt"
            }
        }
    }
}

/// Map a filename extension to a MIME type.
fn mime_from_extension(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        "zip" => Some("application/zip"),
        "json" => Some("application/json"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "csv" => Some("text/csv"),
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}
