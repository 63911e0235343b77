//! Per-agent conversation history with token accounting and compression.
//!
//! Each agent owns an ordered list of chat turns (user / assistant /
//! tool). The system prompt is *not* stored here; it is rebuilt and
//! prepended at send time, which keeps the history free of stale
//! prompts and guarantees a single system turn per request.
//!
//! # Token accounting
//!
//! After every append the manager recomputes a cheap estimate:
//! `content_chars / 4` per turn plus a fixed per-message overhead.
//!
//! # Compression
//!
//! When the estimate exceeds a configured fraction of the model's
//! context window, the oldest turns are folded into a single leading
//! `system` summary turn. The most recent turns are kept verbatim, and
//! the fold boundary never separates an assistant tool-call turn from
//! its tool results.
//!
//! # Persistence
//!
//! Conversations snapshot to `<dir>/<agent_id>.json` and are restored
//! on open. Terminated agents' conversations are retained for audit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agora_llm::types::{ChatMessage, MessageContent};
use agora_types::Result;

/// Fixed token overhead charged per message.
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Marker prefix of the synthetic summary turn.
const SUMMARY_PREFIX: &str = "[Conversation summary]";

/// Maximum characters retained in the summary turn.
const MAX_SUMMARY_CHARS: usize = 2_000;

/// Characters of each folded turn quoted into the summary.
const DIGEST_CHARS: usize = 160;

/// Context usage snapshot for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextStatus {
    /// Estimated tokens currently in the history.
    pub estimated_tokens: usize,
    /// The model's context window.
    pub limit: usize,
    /// `estimated_tokens / limit`.
    pub ratio: f64,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    agent_id: String,
    limit: usize,
    turns: Vec<ChatMessage>,
}

struct Conversation {
    turns: Vec<ChatMessage>,
    limit: usize,
    estimated_tokens: usize,
}

impl Conversation {
    fn new(limit: usize) -> Self {
        Self {
            turns: Vec::new(),
            limit,
            estimated_tokens: 0,
        }
    }

    fn recompute(&mut self) {
        self.estimated_tokens = self.turns.iter().map(estimate_message).sum();
    }
}

/// Estimate the token cost of one message: length/4 plus overhead.
fn estimate_message(message: &ChatMessage) -> usize {
    let mut chars = message.content.approx_len();
    if let Some(ref calls) = message.tool_calls {
        for call in calls {
            chars += call.function.name.len() + call.function.arguments.len();
        }
    }
    chars / 4 + PER_MESSAGE_OVERHEAD
}

/// Maintains every agent's chat history within its context budget.
pub struct ConversationManager {
    dir: PathBuf,
    default_limit: usize,
    compression_threshold: f64,
    retained_turns: usize,
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl ConversationManager {
    /// Open the manager, restoring any snapshots found in `dir`.
    pub fn open(
        dir: impl Into<PathBuf>,
        default_limit: usize,
        compression_threshold: f64,
        retained_turns: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut conversations = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_snapshot(&path) {
                Ok(snapshot) => {
                    let mut conversation = Conversation::new(snapshot.limit);
                    conversation.turns = snapshot.turns;
                    conversation.recompute();
                    conversations.insert(snapshot.agent_id, conversation);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable conversation snapshot");
                }
            }
        }

        Ok(Self {
            dir,
            default_limit,
            compression_threshold,
            retained_turns: retained_turns.max(1),
            conversations: Mutex::new(conversations),
        })
    }

    /// Set the context window for an agent (from its service config).
    pub fn set_limit(&self, agent_id: &str, limit: usize) {
        let mut conversations = self.conversations.lock().expect("conversation lock");
        conversations
            .entry(agent_id.to_string())
            .or_insert_with(|| Conversation::new(limit))
            .limit = limit;
    }

    /// Append a user turn.
    pub fn append_user(&self, agent_id: &str, content: MessageContent) {
        self.append(agent_id, ChatMessage::user(content));
    }

    /// Append an assistant turn (text and/or tool calls), exactly as
    /// returned by the model.
    pub fn append_assistant(&self, agent_id: &str, message: ChatMessage) {
        debug_assert_eq!(message.role, "assistant");
        self.append(agent_id, message);
    }

    /// Append a tool-result turn answering `tool_call_id`.
    pub fn append_tool_result(
        &self,
        agent_id: &str,
        tool_call_id: &str,
        name: &str,
        content: String,
    ) {
        self.append(agent_id, ChatMessage::tool_result(tool_call_id, name, content));
    }

    fn append(&self, agent_id: &str, message: ChatMessage) {
        let mut conversations = self.conversations.lock().expect("conversation lock");
        let conversation = conversations
            .entry(agent_id.to_string())
            .or_insert_with(|| Conversation::new(self.default_limit));
        conversation.estimated_tokens += estimate_message(&message);
        conversation.turns.push(message);
    }

    /// The full ordered history for an agent.
    pub fn messages(&self, agent_id: &str) -> Vec<ChatMessage> {
        let conversations = self.conversations.lock().expect("conversation lock");
        conversations
            .get(agent_id)
            .map(|c| c.turns.clone())
            .unwrap_or_default()
    }

    /// Current context usage for an agent.
    pub fn status(&self, agent_id: &str) -> ContextStatus {
        let conversations = self.conversations.lock().expect("conversation lock");
        match conversations.get(agent_id) {
            Some(c) => ContextStatus {
                estimated_tokens: c.estimated_tokens,
                limit: c.limit,
                ratio: if c.limit == 0 {
                    0.0
                } else {
                    c.estimated_tokens as f64 / c.limit as f64
                },
            },
            None => ContextStatus {
                estimated_tokens: 0,
                limit: self.default_limit,
                ratio: 0.0,
            },
        }
    }

    /// Compress the history when the estimate crosses the threshold.
    /// Returns whether a compression happened.
    pub fn compress_if_needed(&self, agent_id: &str) -> bool {
        let mut conversations = self.conversations.lock().expect("conversation lock");
        let Some(conversation) = conversations.get_mut(agent_id) else {
            return false;
        };

        let budget = (conversation.limit as f64 * self.compression_threshold) as usize;
        if conversation.estimated_tokens <= budget {
            return false;
        }

        // Leading summary from a previous compression is folded anew.
        let has_summary = conversation
            .turns
            .first()
            .map(is_summary_turn)
            .unwrap_or(false);
        let body_start = usize::from(has_summary);
        let body_len = conversation.turns.len() - body_start;
        if body_len <= self.retained_turns {
            return false;
        }

        // Fold everything except the newest `retained_turns` turns, but
        // never cut between an assistant tool-call turn and its results.
        let mut boundary = conversation.turns.len() - self.retained_turns;
        while boundary > body_start && conversation.turns[boundary].role == "tool" {
            boundary -= 1;
        }
        if boundary <= body_start {
            return false;
        }

        let previous_summary = if has_summary {
            Some(conversation.turns[0].content.as_text())
        } else {
            None
        };
        let folded: Vec<ChatMessage> = conversation.turns.drain(..boundary).collect();
        let folded_count = folded.len() - usize::from(has_summary);

        let summary = build_summary(previous_summary.as_deref(), &folded[body_start..]);
        conversation.turns.insert(0, ChatMessage::system(summary));
        conversation.recompute();

        debug!(
            agent = %agent_id,
            folded = folded_count,
            estimated_tokens = conversation.estimated_tokens,
            "compressed conversation"
        );
        true
    }

    /// Snapshot one agent's conversation to disk.
    pub fn snapshot(&self, agent_id: &str) -> Result<()> {
        let conversations = self.conversations.lock().expect("conversation lock");
        let Some(conversation) = conversations.get(agent_id) else {
            return Ok(());
        };
        let snapshot = Snapshot {
            agent_id: agent_id.to_string(),
            limit: conversation.limit,
            turns: conversation.turns.clone(),
        };
        write_snapshot(&self.dir.join(format!("{agent_id}.json")), &snapshot)
    }

    /// Snapshot every conversation (used on shutdown and on the
    /// periodic snapshot tick).
    pub fn snapshot_all(&self) -> Result<()> {
        let agent_ids: Vec<String> = {
            let conversations = self.conversations.lock().expect("conversation lock");
            conversations.keys().cloned().collect()
        };
        for agent_id in agent_ids {
            self.snapshot(&agent_id)?;
        }
        Ok(())
    }

    /// Agents with in-memory history.
    pub fn agent_ids(&self) -> Vec<String> {
        let conversations = self.conversations.lock().expect("conversation lock");
        let mut ids: Vec<String> = conversations.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn is_summary_turn(message: &ChatMessage) -> bool {
    message.role == "system" && message.content.as_text().starts_with(SUMMARY_PREFIX)
}

/// Fold turns into a bounded summary body, oldest lines dropped first.
fn build_summary(previous: Option<&str>, folded: &[ChatMessage]) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(previous) = previous {
        for line in previous.lines().skip(1) {
            lines.push(line.to_string());
        }
    }
    for message in folded {
        let text = message.content.as_text();
        let mut digest: String = text.chars().take(DIGEST_CHARS).collect();
        if text.chars().count() > DIGEST_CHARS {
            digest.push('…');
        }
        if let Some(ref calls) = message.tool_calls {
            let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
            digest.push_str(&format!(" (called: {})", names.join(", ")));
        }
        lines.push(format!("{}: {}", message.role, digest.replace('\n', " ")));
    }

    let mut total: usize = lines.iter().map(|l| l.len() + 1).sum();
    while total > MAX_SUMMARY_CHARS && lines.len() > 1 {
        let removed = lines.remove(0);
        total -= removed.len() + 1;
    }

    format!("{SUMMARY_PREFIX}\n{}", lines.join("\n"))
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_llm::types::{FunctionCall, ToolCall};
    use tempfile::TempDir;

    fn make_manager(limit: usize, retained: usize) -> (TempDir, ConversationManager) {
        let tmp = TempDir::new().unwrap();
        let manager =
            ConversationManager::open(tmp.path().join("conversations"), limit, 0.7, retained)
                .unwrap();
        (tmp, manager)
    }

    fn assistant_with_call(call_id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".into(),
            content: MessageContent::Text(text.into()),
            tool_call_id: None,
            tool_calls: Some(vec![ToolCall {
                id: call_id.into(),
                call_type: "function".into(),
                function: FunctionCall {
                    name: "put_artifact".into(),
                    arguments: "{\"type\":\"text/plain\",\"content\":\"x\"}".into(),
                },
            }]),
            name: None,
        }
    }

    #[test]
    fn appends_accumulate_in_order() {
        let (_tmp, manager) = make_manager(10_000, 8);
        manager.append_user("a1", "hello".into());
        manager.append_assistant("a1", ChatMessage::assistant("hi"));
        manager.append_user("a1", "more".into());

        let turns = manager.messages("a1");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].role, "assistant");
        assert_eq!(turns[2].content.as_text(), "more");
    }

    #[test]
    fn status_tracks_estimate() {
        let (_tmp, manager) = make_manager(1_000, 8);
        assert_eq!(manager.status("a1").estimated_tokens, 0);

        manager.append_user("a1", "x".repeat(400).into());
        let status = manager.status("a1");
        // 400/4 + overhead
        assert_eq!(status.estimated_tokens, 104);
        assert_eq!(status.limit, 1_000);
        assert!((status.ratio - 0.104).abs() < 1e-9);
    }

    #[test]
    fn tool_calls_counted_in_estimate() {
        let (_tmp, manager) = make_manager(1_000, 8);
        manager.append_assistant("a1", assistant_with_call("c1", ""));
        assert!(manager.status("a1").estimated_tokens > PER_MESSAGE_OVERHEAD);
    }

    #[test]
    fn no_compression_below_threshold() {
        let (_tmp, manager) = make_manager(100_000, 4);
        for i in 0..20 {
            manager.append_user("a1", format!("message {i}").into());
        }
        assert!(!manager.compress_if_needed("a1"));
        assert_eq!(manager.messages("a1").len(), 20);
    }

    #[test]
    fn compression_folds_old_turns_into_summary() {
        let (_tmp, manager) = make_manager(200, 4);
        for i in 0..12 {
            manager.append_user("a1", format!("turn number {i} {}", "pad ".repeat(20)).into());
        }
        assert!(manager.compress_if_needed("a1"));

        let turns = manager.messages("a1");
        // Summary + the 4 retained turns.
        assert_eq!(turns.len(), 5);
        assert!(is_summary_turn(&turns[0]));
        assert_eq!(turns[4].content.as_text().contains("turn number 11"), true);
        // Only one system turn, at the head.
        assert_eq!(turns.iter().filter(|t| t.role == "system").count(), 1);
    }

    #[test]
    fn compression_never_splits_tool_pairs() {
        let (_tmp, manager) = make_manager(150, 2);
        for i in 0..4 {
            manager.append_user("a1", format!("filler {i} {}", "pad ".repeat(15)).into());
        }
        // Assistant tool-call turn followed by two results: the retained
        // window of 2 would land inside the group.
        manager.append_assistant("a1", assistant_with_call("c1", ""));
        manager.append_tool_result("a1", "c1", "put_artifact", "{\"ok\":1}".into());
        manager.append_tool_result("a1", "c1", "put_artifact", "{\"ok\":2}".into());

        assert!(manager.compress_if_needed("a1"));
        let turns = manager.messages("a1");

        // Every tool turn must be preceded (eventually) by its assistant.
        let first_non_summary = &turns[1];
        assert_ne!(first_non_summary.role, "tool");
        let assistant_idx = turns.iter().position(|t| t.role == "assistant").unwrap();
        for (i, turn) in turns.iter().enumerate() {
            if turn.role == "tool" {
                assert!(i > assistant_idx);
            }
        }
    }

    #[test]
    fn recompression_folds_previous_summary() {
        let (_tmp, manager) = make_manager(200, 2);
        for i in 0..10 {
            manager.append_user("a1", format!("early {i} {}", "pad ".repeat(20)).into());
        }
        assert!(manager.compress_if_needed("a1"));
        for i in 0..10 {
            manager.append_user("a1", format!("late {i} {}", "pad ".repeat(20)).into());
        }
        assert!(manager.compress_if_needed("a1"));

        let turns = manager.messages("a1");
        assert_eq!(turns.iter().filter(|t| is_summary_turn(t)).count(), 1);
        assert!(is_summary_turn(&turns[0]));
    }

    #[test]
    fn summary_is_bounded() {
        let (_tmp, manager) = make_manager(400, 2);
        for i in 0..60 {
            manager.append_user("a1", format!("long turn {i} {}", "word ".repeat(60)).into());
        }
        while manager.compress_if_needed("a1") {}
        let turns = manager.messages("a1");
        assert!(turns[0].content.as_text().len() <= MAX_SUMMARY_CHARS + SUMMARY_PREFIX.len() + 1);
    }

    #[test]
    fn snapshot_and_restore() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("conversations");
        {
            let manager = ConversationManager::open(&dir, 5_000, 0.7, 8).unwrap();
            manager.append_user("a1", "persisted".into());
            manager.append_assistant("a1", ChatMessage::assistant("yes"));
            manager.set_limit("a1", 9_000);
            manager.snapshot_all().unwrap();
        }

        let manager = ConversationManager::open(&dir, 5_000, 0.7, 8).unwrap();
        let turns = manager.messages("a1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content.as_text(), "persisted");
        assert_eq!(manager.status("a1").limit, 9_000);
    }
}
