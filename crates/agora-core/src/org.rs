//! Persistent organisation store: roles, agents, terminations.
//!
//! Backed by three files under the org directory:
//!
//! ```text
//! org/roles.json          all role records
//! org/agents.json         all agent records (terminated ones retained)
//! org/terminations.jsonl  append-only termination audit log
//! ```
//!
//! Mutations are write-through: the in-memory cache and the JSON file
//! are updated together, with atomic temp-rename writes. Terminated
//! agents are kept in `agents.json` for audit; only their status flips.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use agora_types::org::{
    AgentRecord, AgentStatus, OrgTreeNode, RoleRecord, TerminationRecord, ROOT_AGENT_ID,
    USER_AGENT_ID,
};
use agora_types::{AgoraError, Result};

/// Role id assigned to the built-in sentinel agents.
pub const SENTINEL_ROLE_ID: &str = "system";

/// Parameters for [`OrgStore::create_role`].
#[derive(Debug, Clone)]
pub struct CreateRole {
    /// Display name.
    pub name: String,
    /// System instructions for agents of this role.
    pub role_prompt: String,
    /// Optional org-architecture prompt.
    pub org_prompt: Option<String>,
    /// Allowed tool groups (empty = unrestricted).
    pub tool_groups: Vec<String>,
    /// Preferred LLM service id.
    pub preferred_service: Option<String>,
    /// Creator agent id.
    pub created_by: String,
}

/// Parameters for [`OrgStore::create_agent`].
#[derive(Debug, Clone)]
pub struct CreateAgent {
    /// Role to instantiate.
    pub role_id: String,
    /// Parent agent id.
    pub parent_id: String,
    /// Optional human-assigned name.
    pub custom_name: Option<String>,
}

/// Fields that may change on a role after creation.
#[derive(Debug, Clone, Default)]
pub struct UpdateRole {
    /// New display name.
    pub name: Option<String>,
    /// New org-architecture prompt.
    pub org_prompt: Option<String>,
}

/// Persistent store of roles and agent metadata.
pub struct OrgStore {
    dir: PathBuf,
    roles: Mutex<HashMap<String, RoleRecord>>,
    agents: Mutex<HashMap<String, AgentRecord>>,
}

impl OrgStore {
    /// Open the store at `dir`, loading any existing records and
    /// ensuring the `root` and `user` sentinel agents exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let roles = load_map::<RoleRecord>(&dir.join("roles.json"), |r| r.id.clone())?;
        let agents = load_map::<AgentRecord>(&dir.join("agents.json"), |a| a.id.clone())?;

        let store = Self {
            dir,
            roles: Mutex::new(roles),
            agents: Mutex::new(agents),
        };
        store.ensure_sentinels()?;
        Ok(store)
    }

    /// Create the sentinel agents and their built-in role if they are
    /// missing (fresh store or partially corrupted one).
    fn ensure_sentinels(&self) -> Result<()> {
        let now = Utc::now();
        {
            let mut roles = self.roles.lock().expect("org lock");
            if !roles.contains_key(SENTINEL_ROLE_ID) {
                roles.insert(
                    SENTINEL_ROLE_ID.to_string(),
                    RoleRecord {
                        id: SENTINEL_ROLE_ID.to_string(),
                        name: "root orchestrator".to_string(),
                        role_prompt: "You are the root orchestrator of a team of agents. \
                                      Break the user's requirement into tasks, create roles, \
                                      spawn agents with clear task briefs, and coordinate them \
                                      until the requirement is met. Report results back to the \
                                      user with send_message."
                            .to_string(),
                        org_prompt: None,
                        tool_groups: Vec::new(),
                        preferred_service: None,
                        created_by: ROOT_AGENT_ID.to_string(),
                        created_at: now,
                    },
                );
                save_map(&self.dir.join("roles.json"), &roles)?;
            }
        }

        let mut agents = self.agents.lock().expect("org lock");
        for id in [ROOT_AGENT_ID, USER_AGENT_ID] {
            agents.entry(id.to_string()).or_insert_with(|| {
                debug!(agent = %id, "creating sentinel agent");
                AgentRecord {
                    id: id.to_string(),
                    role_id: SENTINEL_ROLE_ID.to_string(),
                    custom_name: None,
                    parent_id: None,
                    status: AgentStatus::Active,
                    created_at: now,
                    last_activity_at: now,
                }
            });
        }
        save_map(&self.dir.join("agents.json"), &agents)
    }

    // ── Roles ────────────────────────────────────────────────────────

    /// Create and persist a role.
    pub fn create_role(&self, params: CreateRole) -> Result<RoleRecord> {
        let role = RoleRecord {
            id: format!("role-{}", short_id()),
            name: params.name,
            role_prompt: params.role_prompt,
            org_prompt: params.org_prompt,
            tool_groups: params.tool_groups,
            preferred_service: params.preferred_service,
            created_by: params.created_by,
            created_at: Utc::now(),
        };
        let mut roles = self.roles.lock().expect("org lock");
        roles.insert(role.id.clone(), role.clone());
        save_map(&self.dir.join("roles.json"), &roles)?;
        debug!(role = %role.id, name = %role.name, "created role");
        Ok(role)
    }

    /// Fetch a role by id.
    pub fn get_role(&self, id: &str) -> Option<RoleRecord> {
        self.roles.lock().expect("org lock").get(id).cloned()
    }

    /// Find a role by display name (first match).
    pub fn find_role_by_name(&self, name: &str) -> Option<RoleRecord> {
        let roles = self.roles.lock().expect("org lock");
        let mut matches: Vec<&RoleRecord> = roles.values().filter(|r| r.name == name).collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matches.first().map(|r| (*r).clone())
    }

    /// All roles, sorted by creation time.
    pub fn list_roles(&self) -> Vec<RoleRecord> {
        let roles = self.roles.lock().expect("org lock");
        let mut list: Vec<RoleRecord> = roles.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Update a role's mutable description fields.
    pub fn update_role(&self, id: &str, update: UpdateRole) -> Result<RoleRecord> {
        let mut roles = self.roles.lock().expect("org lock");
        let role = roles
            .get_mut(id)
            .ok_or_else(|| AgoraError::Org(format!("no such role: {id}")))?;
        if let Some(name) = update.name {
            role.name = name;
        }
        if let Some(org_prompt) = update.org_prompt {
            role.org_prompt = Some(org_prompt);
        }
        let updated = role.clone();
        save_map(&self.dir.join("roles.json"), &roles)?;
        Ok(updated)
    }

    // ── Agents ───────────────────────────────────────────────────────

    /// Create and persist an agent under an existing parent.
    pub fn create_agent(&self, params: CreateAgent) -> Result<AgentRecord> {
        {
            let roles = self.roles.lock().expect("org lock");
            if params.role_id != SENTINEL_ROLE_ID && !roles.contains_key(&params.role_id) {
                return Err(AgoraError::Org(format!("no such role: {}", params.role_id)));
            }
        }

        let mut agents = self.agents.lock().expect("org lock");
        if !agents.contains_key(&params.parent_id) {
            return Err(AgoraError::Org(format!(
                "no such parent agent: {}",
                params.parent_id
            )));
        }

        let now = Utc::now();
        let agent = AgentRecord {
            id: format!("agent-{}", short_id()),
            role_id: params.role_id,
            custom_name: params.custom_name,
            parent_id: Some(params.parent_id),
            status: AgentStatus::Active,
            created_at: now,
            last_activity_at: now,
        };
        agents.insert(agent.id.clone(), agent.clone());
        save_map(&self.dir.join("agents.json"), &agents)?;
        debug!(agent = %agent.id, role = %agent.role_id, "created agent");
        Ok(agent)
    }

    /// Fetch an agent by id.
    pub fn get_agent(&self, id: &str) -> Option<AgentRecord> {
        self.agents.lock().expect("org lock").get(id).cloned()
    }

    /// All agents, sorted by creation time.
    pub fn list_agents(&self) -> Vec<AgentRecord> {
        let agents = self.agents.lock().expect("org lock");
        let mut list: Vec<AgentRecord> = agents.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Record a custom name assigned after spawn.
    pub fn set_custom_name(&self, id: &str, name: &str) -> Result<()> {
        let mut agents = self.agents.lock().expect("org lock");
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| AgoraError::Org(format!("no such agent: {id}")))?;
        agent.custom_name = Some(name.to_string());
        save_map(&self.dir.join("agents.json"), &agents)
    }

    /// Update an agent's last-activity timestamp.
    pub fn touch(&self, id: &str) {
        let mut agents = self.agents.lock().expect("org lock");
        if let Some(agent) = agents.get_mut(id) {
            agent.last_activity_at = Utc::now();
        }
        // Activity timestamps are flushed with the next mutation; they
        // are advisory and not worth a disk write per message.
    }

    /// Mark an agent terminated and append to the audit log.
    pub fn mark_terminated(&self, id: &str, reason: Option<&str>) -> Result<()> {
        let mut agents = self.agents.lock().expect("org lock");
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| AgoraError::Org(format!("no such agent: {id}")))?;
        if agent.status == AgentStatus::Terminated {
            warn!(agent = %id, "agent already terminated");
            return Ok(());
        }
        agent.status = AgentStatus::Terminated;
        save_map(&self.dir.join("agents.json"), &agents)?;
        drop(agents);

        let record = TerminationRecord {
            agent_id: id.to_string(),
            reason: reason.map(String::from),
            at: Utc::now(),
        };
        append_jsonl(&self.dir.join("terminations.jsonl"), &record)?;
        debug!(agent = %id, "marked terminated");
        Ok(())
    }

    /// Direct children of an agent (any status), in creation order.
    pub fn children_of(&self, id: &str) -> Vec<AgentRecord> {
        let agents = self.agents.lock().expect("org lock");
        let mut children: Vec<AgentRecord> = agents
            .values()
            .filter(|a| a.parent_id.as_deref() == Some(id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        children
    }

    /// All descendants of an agent in post-order (deepest first), the
    /// order a cascade terminates them in.
    pub fn descendants_post_order(&self, id: &str) -> Vec<AgentRecord> {
        let mut out = Vec::new();
        for child in self.children_of(id) {
            out.extend(self.descendants_post_order(&child.id));
            out.push(child);
        }
        out
    }

    /// Whether `candidate` is a (transitive) descendant of `ancestor`.
    pub fn is_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        let agents = self.agents.lock().expect("org lock");
        let mut current = agents.get(candidate).and_then(|a| a.parent_id.clone());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = agents.get(&parent).and_then(|a| a.parent_id.clone());
        }
        false
    }

    /// The nested agent tree rooted at `root`.
    pub fn org_tree(&self) -> OrgTreeNode {
        self.subtree(ROOT_AGENT_ID)
    }

    fn subtree(&self, id: &str) -> OrgTreeNode {
        let record = self.get_agent(id);
        let (name, role_id, status) = match record {
            Some(ref r) => (
                r.display_name().to_string(),
                r.role_id.clone(),
                r.status,
            ),
            None => (id.to_string(), SENTINEL_ROLE_ID.to_string(), AgentStatus::Active),
        };
        OrgTreeNode {
            id: id.to_string(),
            name,
            role_id,
            status,
            children: self
                .children_of(id)
                .iter()
                .map(|c| self.subtree(&c.id))
                .collect(),
        }
    }

    /// Read the termination audit log.
    pub fn terminations(&self) -> Result<Vec<TerminationRecord>> {
        let path = self.dir.join("terminations.jsonl");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for line in std::fs::read_to_string(&path)?.lines() {
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn load_map<T: serde::de::DeserializeOwned>(
    path: &Path,
    key: impl Fn(&T) -> String,
) -> Result<HashMap<String, T>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let list: Vec<T> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(list.into_iter().map(|item| (key(&item), item)).collect())
}

fn save_map<T: serde::Serialize>(path: &Path, map: &HashMap<String, T>) -> Result<()> {
    // Stable on-disk order keeps diffs readable.
    let mut serialized: Vec<serde_json::Value> = map
        .values()
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()?;
    serialized.sort_by(|a, b| {
        a.get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .cmp(b.get("id").and_then(|v| v.as_str()).unwrap_or(""))
    });
    let content = serde_json::to_string_pretty(&serialized)?;

    let tmp = path.with_extension(format!("tmp-{}", short_id()));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn append_jsonl<T: serde::Serialize>(path: &Path, record: &T) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", serde_json::to_string(record)?)?;
    Ok(())
}
