//! Runtime configuration.
//!
//! [`RuntimeConfig`] gathers every tunable the runtime exposes: data
//! directory layout, scheduler and LLM concurrency caps, tool-loop
//! bounds, conversation compression knobs, and shutdown grace. All
//! fields have serde defaults so a config file only needs to name what
//! it overrides; [`RuntimeConfig::from_env`] applies the environment
//! variables the runtime recognises on top of the defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::service::ServiceConfig;

/// Environment variable naming the data directory.
pub const ENV_DATA_DIR: &str = "AGORA_DATA_DIR";

/// Environment variable naming the config directory.
pub const ENV_CONFIG_DIR: &str = "AGORA_CONFIG_DIR";

/// Environment variable forcing the local-LLM path into headless mode
/// (treated as "disabled" by the `localllm_chat` tool).
pub const ENV_LOCALLLM_HEADLESS: &str = "AGORA_LOCALLLM_HEADLESS";

/// All runtime tunables, with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Root of the persistent layout (`artifacts/`, `workspaces/`,
    /// `conversations/`, `org/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding configuration files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,

    /// Maximum agents processing messages at the same time.
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    /// Maximum consecutive tool-call rounds per inbound message.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Global cap on in-flight LLM HTTP calls.
    #[serde(default = "default_llm_concurrency")]
    pub llm_concurrency: usize,

    /// Maximum retry attempts for transient LLM failures.
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,

    /// Base backoff delay between LLM retries, in milliseconds.
    #[serde(default = "default_llm_base_delay_ms")]
    pub llm_base_delay_ms: u64,

    /// Backoff delay ceiling, in milliseconds.
    #[serde(default = "default_llm_max_delay_ms")]
    pub llm_max_delay_ms: u64,

    /// Per-attempt LLM request timeout, in seconds.
    #[serde(default = "default_llm_request_timeout_secs")]
    pub llm_request_timeout_secs: u64,

    /// Fraction of the context window at which conversation history is
    /// compressed.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,

    /// Number of most-recent turns kept verbatim through compression.
    #[serde(default = "default_retained_turns")]
    pub retained_turns: usize,

    /// Fraction of the context window at which the context-status hint
    /// is added to the system prompt.
    #[serde(default = "default_context_hint_threshold")]
    pub context_hint_threshold: f64,

    /// Seconds between conversation snapshots to disk.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// Grace period for in-flight work during shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Whether the optional local-LLM path is enabled.
    #[serde(default)]
    pub localllm_enabled: bool,

    /// Configured chat-completion services. The first entry is the
    /// default for roles without a `preferred_service`.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_concurrent_agents() -> usize {
    4
}

fn default_max_tool_rounds() -> u32 {
    12
}

fn default_llm_concurrency() -> usize {
    2
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_base_delay_ms() -> u64 {
    1_000
}

fn default_llm_max_delay_ms() -> u64 {
    30_000
}

fn default_llm_request_timeout_secs() -> u64 {
    120
}

fn default_compression_threshold() -> f64 {
    0.7
}

fn default_retained_turns() -> usize {
    8
}

fn default_context_hint_threshold() -> f64 {
    0.5
}

fn default_snapshot_interval_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config deserializes")
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with the recognised environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
            if !dir.is_empty() {
                config.config_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(flag) = std::env::var(ENV_LOCALLLM_HEADLESS) {
            if flag == "1" || flag.eq_ignore_ascii_case("true") {
                config.localllm_enabled = false;
            }
        }
        config
    }

    /// Directory holding artifact data and meta files.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    /// Directory holding per-task workspaces.
    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    /// Directory holding conversation snapshots.
    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    /// Directory holding the org store (roles, agents, terminations).
    pub fn org_dir(&self) -> PathBuf {
        self.data_dir.join("org")
    }

    /// Resolve a service by id, or fall back to the first configured one.
    pub fn service(&self, id: Option<&str>) -> Option<&ServiceConfig> {
        match id {
            Some(id) => self.services.iter().find(|s| s.id == id),
            None => self.services.first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.max_concurrent_agents, 4);
        assert_eq!(config.max_tool_rounds, 12);
        assert_eq!(config.llm_concurrency, 2);
        assert!((config.compression_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.retained_turns, 8);
        assert!(!config.localllm_enabled);
        assert!(config.services.is_empty());
    }

    #[test]
    fn layout_dirs_hang_off_data_dir() {
        let config = RuntimeConfig {
            data_dir: PathBuf::from("/srv/agora"),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.artifacts_dir(), PathBuf::from("/srv/agora/artifacts"));
        assert_eq!(config.workspaces_dir(), PathBuf::from("/srv/agora/workspaces"));
        assert_eq!(
            config.conversations_dir(),
            PathBuf::from("/srv/agora/conversations")
        );
        assert_eq!(config.org_dir(), PathBuf::from("/srv/agora/org"));
    }

    #[test]
    fn partial_json_overrides() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"max_tool_rounds": 3, "llm_concurrency": 8}"#).unwrap();
        assert_eq!(config.max_tool_rounds, 3);
        assert_eq!(config.llm_concurrency, 8);
        assert_eq!(config.max_concurrent_agents, 4);
    }

    #[test]
    fn service_lookup_falls_back_to_first() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"services":[
                {"id":"a","base_url":"http://a/v1","model":"m1"},
                {"id":"b","base_url":"http://b/v1","model":"m2"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.service(None).unwrap().id, "a");
        assert_eq!(config.service(Some("b")).unwrap().id, "b");
        assert!(config.service(Some("missing")).is_none());
    }
}
