//! The `run_javascript` tool: sandboxed code execution with canvas
//! capture.
//!
//! The concrete sandbox is pluggable behind [`JsSandbox`]; the tool
//! owns the parts that are contract, not mechanism:
//!
//! * a blocked-pattern precheck (`process`, `require`, filesystem and
//!   network access) that rejects code before it reaches any executor;
//! * persistence of `getCanvas(w, h)` bitmaps as PNG artifacts, with
//!   the resulting references returned alongside the script result.
//!
//! Without a configured sandbox the tool reports a structured
//! execution failure rather than running anything.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use agora_core::artifact::{ArtifactStore, PutContent};
use agora_core::tools::registry::{required_str, Tool, ToolContext, ToolError};

/// Substrings that must not appear in submitted code. Matching is done
/// on a comment-stripped copy, case-sensitively.
const BLOCKED_PATTERNS: &[&str] = &[
    "process",
    "require",
    "import(",
    "child_process",
    "Function(",
    "eval(",
    "fs.",
    "globalThis",
    "XMLHttpRequest",
    "fetch(",
    "WebSocket",
    "Deno",
    "Bun",
];

/// One bitmap produced by `getCanvas` during execution.
#[derive(Debug, Clone)]
pub struct CanvasImage {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
}

/// What a sandbox run produced.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// The script's result value.
    pub result: Value,
    /// Canvases drawn during the run, in creation order.
    pub canvases: Vec<CanvasImage>,
}

/// A sandboxed JavaScript executor.
///
/// Implementations must deny filesystem, network, and process access;
/// the only host API offered to scripts is `getCanvas(w, h)`.
#[async_trait]
pub trait JsSandbox: Send + Sync {
    /// Execute `code` with an optional `input` value bound for the
    /// script, returning its result and any canvases drawn.
    async fn execute(&self, code: &str, input: Option<Value>)
        -> Result<SandboxOutcome, ToolError>;
}

/// Find the first blocked pattern in `code`, ignoring comments.
fn find_blocked_pattern(code: &str) -> Option<&'static str> {
    let stripped = strip_comments(code);
    BLOCKED_PATTERNS
        .iter()
        .find(|pattern| stripped.contains(*pattern))
        .copied()
}

/// Remove `//` line comments and `/* */` block comments.
fn strip_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let bytes = code.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() {
            if bytes[i + 1] == b'/' {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            if bytes[i + 1] == b'*' {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Run JavaScript in the configured sandbox.
pub struct RunJavascriptTool {
    artifacts: Arc<ArtifactStore>,
    sandbox: Option<Arc<dyn JsSandbox>>,
}

impl RunJavascriptTool {
    /// Wire the tool; `sandbox = None` disables execution.
    pub fn new(artifacts: Arc<ArtifactStore>, sandbox: Option<Arc<dyn JsSandbox>>) -> Self {
        Self { artifacts, sandbox }
    }
}

#[async_trait]
impl Tool for RunJavascriptTool {
    fn name(&self) -> &str {
        "run_javascript"
    }

    fn description(&self) -> &str {
        "Run JavaScript in a sandbox. No filesystem, network, or process access. \
         getCanvas(w, h) draws bitmaps that are saved as image artifacts."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "JavaScript source to run" },
                "input": { "description": "Optional value bound as `input` for the script" }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let code = required_str(&args, "code")?;

        if let Some(pattern) = find_blocked_pattern(&code) {
            warn!(agent = %ctx.agent_id, pattern = %pattern, "blocked javascript submission");
            return Err(ToolError::BlockedCode(format!(
                "use of '{pattern}' is not allowed"
            )));
        }

        let sandbox = self.sandbox.as_ref().ok_or_else(|| {
            ToolError::ExecutionFailed("no JavaScript sandbox is configured".into())
        })?;

        let outcome = sandbox.execute(&code, args.get("input").cloned()).await?;

        let mut artifact_ids = Vec::new();
        for canvas in &outcome.canvases {
            let mut meta = serde_json::Map::new();
            meta.insert("filename".into(), Value::String("canvas.png".into()));
            meta.insert("width".into(), Value::from(canvas.width));
            meta.insert("height".into(), Value::from(canvas.height));
            let reference = self
                .artifacts
                .put(
                    "image/png",
                    PutContent::Bytes(canvas.png.clone()),
                    meta,
                    ctx.message_id.clone(),
                )
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            artifact_ids.push(reference);
        }

        debug!(
            agent = %ctx.agent_id,
            canvases = artifact_ids.len(),
            "javascript executed"
        );
        Ok(json!({
            "result": outcome.result,
            "artifactIds": artifact_ids,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Sandbox fake returning a scripted outcome.
    struct FakeSandbox {
        outcome: SandboxOutcome,
    }

    #[async_trait]
    impl JsSandbox for FakeSandbox {
        async fn execute(
            &self,
            _code: &str,
            input: Option<Value>,
        ) -> Result<SandboxOutcome, ToolError> {
            let mut outcome = self.outcome.clone();
            if let Some(input) = input {
                outcome.result = json!({"echoed": input});
            }
            Ok(outcome)
        }
    }

    fn tool_with(outcome: SandboxOutcome) -> (TempDir, Arc<ArtifactStore>, RunJavascriptTool) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(tmp.path().join("artifacts")).unwrap());
        let tool = RunJavascriptTool::new(store.clone(), Some(Arc::new(FakeSandbox { outcome })));
        (tmp, store, tool)
    }

    fn plain_outcome() -> SandboxOutcome {
        SandboxOutcome {
            result: json!(42),
            canvases: vec![],
        }
    }

    #[tokio::test]
    async fn executes_and_returns_result() {
        let (_tmp, _store, tool) = tool_with(plain_outcome());
        let out = tool
            .execute(&ToolContext::for_agent("a1"), json!({"code": "6 * 7"}))
            .await
            .unwrap();
        assert_eq!(out["result"], 42);
        assert_eq!(out["artifactIds"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn input_passed_through() {
        let (_tmp, _store, tool) = tool_with(plain_outcome());
        let out = tool
            .execute(
                &ToolContext::for_agent("a1"),
                json!({"code": "input", "input": {"k": 1}}),
            )
            .await
            .unwrap();
        assert_eq!(out["result"]["echoed"]["k"], 1);
    }

    #[tokio::test]
    async fn dangerous_patterns_blocked() {
        let (_tmp, _store, tool) = tool_with(plain_outcome());
        for code in [
            "require('fs')",
            "process.exit(1)",
            "const cp = child_process",
            "eval('x')",
            "fetch('http://example.com')",
            "fs.readFileSync('/etc/passwd')",
        ] {
            let err = tool
                .execute(&ToolContext::for_agent("a1"), json!({"code": code}))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "blocked_code", "code: {code}");
        }
    }

    #[tokio::test]
    async fn patterns_in_comments_do_not_block() {
        let (_tmp, _store, tool) = tool_with(plain_outcome());
        let code = "// process is documented here\n/* require too */\n1 + 1";
        let out = tool
            .execute(&ToolContext::for_agent("a1"), json!({"code": code}))
            .await
            .unwrap();
        assert_eq!(out["result"], 42);
    }

    #[tokio::test]
    async fn canvases_persisted_as_png_artifacts() {
        let outcome = SandboxOutcome {
            result: json!("drawn"),
            canvases: vec![CanvasImage {
                width: 2,
                height: 2,
                png: b"\x89PNG\r\n\x1a\n----".to_vec(),
            }],
        };
        let (_tmp, store, tool) = tool_with(outcome);
        let out = tool
            .execute(
                &ToolContext {
                    agent_id: "a1".into(),
                    task_id: None,
                    message_id: Some("msg-9".into()),
                },
                json!({"code": "getCanvas(2,2)"}),
            )
            .await
            .unwrap();

        let ids = out["artifactIds"].as_array().unwrap();
        assert_eq!(ids.len(), 1);
        let artifact = store.get(ids[0].as_str().unwrap()).unwrap();
        assert!(artifact.is_binary);
        assert_eq!(artifact.mime_type.as_deref(), Some("image/png"));
        assert_eq!(artifact.meta["width"], 2);
        assert_eq!(artifact.message_id.as_deref(), Some("msg-9"));
    }

    #[tokio::test]
    async fn no_sandbox_is_execution_failure_not_block() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(tmp.path().join("artifacts")).unwrap());
        let tool = RunJavascriptTool::new(store, None);
        let err = tool
            .execute(&ToolContext::for_agent("a1"), json!({"code": "1 + 1"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "execution_failed");
    }

    #[test]
    fn comment_stripping() {
        assert_eq!(strip_comments("a // b\nc"), "a \nc");
        assert_eq!(strip_comments("a /* b */ c"), "a  c");
        assert_eq!(strip_comments("no comments"), "no comments");
    }
}
