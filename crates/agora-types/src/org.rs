//! Organisation records: roles, agents, and the compute-status machine.
//!
//! A [`RoleRecord`] is a reusable agent template (system prompt plus
//! permissions). An [`AgentRecord`] is one running instance of a role,
//! part of a tree rooted at [`ROOT_AGENT_ID`]. Two sentinel agents always
//! exist: `root` (the top-level orchestrator) and `user` (the human
//! endpoint, which is never a recipient of its own messages).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel id for the human endpoint.
pub const USER_AGENT_ID: &str = "user";

/// Sentinel id for the root orchestrator agent.
pub const ROOT_AGENT_ID: &str = "root";

/// A reusable agent template.
///
/// Immutable after creation except for description fields; persisted in
/// the org store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Unique role id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// System instructions for agents of this role.
    pub role_prompt: String,

    /// Optional organisation-architecture prompt. When absent, agents
    /// inherit the creator's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_prompt: Option<String>,

    /// Tool-group ids this role is allowed to use. Empty = all groups.
    #[serde(default)]
    pub tool_groups: Vec<String>,

    /// Preferred LLM service id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_service: Option<String>,

    /// Agent id of the creator.
    pub created_by: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// The agent is live (or at least not yet terminated).
    Active,
    /// The agent has been terminated; the record is kept for audit.
    Terminated,
}

/// A running (or terminated) instance of a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique agent id.
    pub id: String,

    /// The role this agent instantiates.
    pub role_id: String,

    /// Human-readable name assigned at spawn (best-effort LLM naming).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,

    /// Parent agent id. `None` only for the sentinels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Lifecycle status.
    pub status: AgentStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last time this agent processed a message.
    pub last_activity_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Display name: the custom name when assigned, else the id.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.id)
    }
}

/// Orchestration-visible state of a live agent.
///
/// ```text
/// idle ──(message dequeued)──▶ processing
/// processing ──(LLM call)──▶ waiting_llm
/// waiting_llm ──(response)──▶ processing
/// processing ──(no tool calls)──▶ idle
/// {processing,waiting_llm} ──(abort)──▶ stopping ──▶ stopped ──▶ idle
/// any ──(terminate cascade)──▶ terminating
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
    /// Waiting for a message.
    Idle,
    /// An LLM call is in flight.
    WaitingLlm,
    /// Handling a message (between LLM calls / running tools).
    Processing,
    /// An abort was requested; winding down.
    Stopping,
    /// Aborted; inbox was purged. Returns to idle on the next dispatch.
    Stopped,
    /// Being removed as part of a terminate cascade. Terminal.
    Terminating,
}

impl ComputeStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Terminating` is terminal. Any non-terminal state may enter
    /// `Terminating`.
    pub fn can_transition_to(self, next: ComputeStatus) -> bool {
        use ComputeStatus::*;
        if self == Terminating {
            return false;
        }
        if next == Terminating {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Processing)
                | (Processing, WaitingLlm)
                | (Processing, Idle)
                | (Processing, Stopping)
                | (WaitingLlm, Processing)
                | (WaitingLlm, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Idle)
        )
    }
}

/// One entry in the termination audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationRecord {
    /// The terminated agent.
    pub agent_id: String,

    /// Reason supplied by the terminator, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// When the termination was recorded.
    pub at: DateTime<Utc>,
}

/// A node in the rendered org tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgTreeNode {
    /// Agent id.
    pub id: String,

    /// Display name (custom name or id).
    pub name: String,

    /// Role id of this agent.
    pub role_id: String,

    /// Lifecycle status.
    pub status: AgentStatus,

    /// Child agents, in creation order.
    #[serde(default)]
    pub children: Vec<OrgTreeNode>,
}
