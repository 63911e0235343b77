//! Live agent instances: spawn, status machine, abort, cascade
//! termination.
//!
//! [`AgentManager`] owns the runtime state of every live agent: its
//! compute status, cancellation token, task brief, workspace binding,
//! and preferred LLM service. Persistent identity lives in the
//! [`OrgStore`]; the manager keeps the two in step.
//!
//! Status transitions go through [`AgentManager::set_status`], which
//! validates against the compute-status machine; illegal transitions
//! are ignored with a warning rather than panicking the scheduler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agora_types::org::{AgentRecord, ComputeStatus, ROOT_AGENT_ID, USER_AGENT_ID};
use agora_types::{AgoraError, Result, TaskBrief};

use crate::bus::MessageBus;
use crate::events::{EventBus, RuntimeEvent};
use crate::org::{CreateAgent, OrgStore};
use crate::tools::registry::ToolError;

/// Parameters for [`AgentManager::spawn`].
#[derive(Debug, Clone)]
pub struct SpawnAgent {
    /// Role to instantiate.
    pub role_id: String,
    /// Parent agent id.
    pub parent_id: String,
    /// Resolved custom name (naming happens before this call).
    pub custom_name: Option<String>,
    /// Task brief bound to the new agent.
    pub brief: Option<TaskBrief>,
    /// Workspace (task id) the agent is bound to.
    pub workspace_task: Option<String>,
    /// LLM service the agent should use.
    pub service_id: Option<String>,
}

struct LiveAgent {
    compute_status: ComputeStatus,
    cancel: CancellationToken,
    brief: Option<TaskBrief>,
    workspace_task: Option<String>,
    service_id: Option<String>,
}

impl LiveAgent {
    fn new(brief: Option<TaskBrief>, workspace_task: Option<String>, service_id: Option<String>) -> Self {
        Self {
            compute_status: ComputeStatus::Idle,
            cancel: CancellationToken::new(),
            brief,
            workspace_task,
            service_id,
        }
    }
}

/// Lifecycle manager for live agent instances.
pub struct AgentManager {
    org: Arc<OrgStore>,
    bus: Arc<MessageBus>,
    events: EventBus,
    live: Mutex<HashMap<String, LiveAgent>>,
}

impl AgentManager {
    /// Create a manager over the given org store and bus.
    pub fn new(org: Arc<OrgStore>, bus: Arc<MessageBus>, events: EventBus) -> Self {
        Self {
            org,
            bus,
            events,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Register the sentinel endpoints: `root` as a live, schedulable
    /// agent; `user` as a bus recipient only (the human endpoint is
    /// drained by the outer API, never scheduled).
    pub fn register_sentinels(&self, root_service_id: Option<String>) {
        self.bus.register_recipient(ROOT_AGENT_ID);
        self.bus.register_recipient(USER_AGENT_ID);
        let mut live = self.live.lock().expect("live lock");
        live.entry(ROOT_AGENT_ID.to_string())
            .or_insert_with(|| LiveAgent::new(None, None, root_service_id));
    }

    /// The org store this manager persists into.
    pub fn org(&self) -> &Arc<OrgStore> {
        &self.org
    }

    /// Spawn a new live agent under an existing parent.
    pub fn spawn(&self, spec: SpawnAgent) -> Result<AgentRecord> {
        let record = self.org.create_agent(CreateAgent {
            role_id: spec.role_id,
            parent_id: spec.parent_id.clone(),
            custom_name: spec.custom_name,
        })?;

        self.bus.register_recipient(&record.id);
        {
            let mut live = self.live.lock().expect("live lock");
            live.insert(
                record.id.clone(),
                LiveAgent::new(spec.brief, spec.workspace_task, spec.service_id),
            );
        }

        info!(agent = %record.id, role = %record.role_id, parent = %spec.parent_id, "spawned agent");
        self.events.publish(RuntimeEvent::AgentSpawned {
            agent_id: record.id.clone(),
            role_id: record.role_id.clone(),
            parent_id: spec.parent_id,
        });
        Ok(record)
    }

    /// Terminate an agent and cascade to all descendants (post-order:
    /// deepest first, the target last). For each agent this aborts any
    /// in-flight call, purges and unregisters its inbox, clears its
    /// task brief, and persists the termination.
    ///
    /// Returns the terminated agent ids in termination order.
    pub fn terminate(&self, agent_id: &str, reason: Option<&str>) -> Result<Vec<String>> {
        if agent_id == ROOT_AGENT_ID || agent_id == USER_AGENT_ID {
            return Err(AgoraError::Org(format!(
                "sentinel agent '{agent_id}' cannot be terminated"
            )));
        }
        if self.org.get_agent(agent_id).is_none() {
            return Err(AgoraError::Org(format!("no such agent: {agent_id}")));
        }

        let mut order: Vec<String> = self
            .org
            .descendants_post_order(agent_id)
            .into_iter()
            .map(|a| a.id)
            .collect();
        order.push(agent_id.to_string());

        for id in &order {
            {
                let mut live = self.live.lock().expect("live lock");
                if let Some(agent) = live.get_mut(id) {
                    agent.compute_status = ComputeStatus::Terminating;
                    agent.cancel.cancel();
                    agent.brief = None;
                }
                live.remove(id);
            }
            let dropped = self.bus.abort_pending(id);
            self.bus.unregister_recipient(id);
            self.org.mark_terminated(id, reason)?;
            debug!(agent = %id, dropped_messages = dropped, "terminated agent");
            self.events.publish(RuntimeEvent::AgentTerminated {
                agent_id: id.clone(),
                reason: reason.map(String::from),
            });
        }

        Ok(order)
    }

    /// Abort an agent's in-flight work: signal its LLM call, purge its
    /// inbox, and park it in `stopped`. With `cascade` the same is
    /// applied to every descendant.
    ///
    /// Returns the affected agent ids, or `already_stopped` when the
    /// target has nothing to abort.
    pub fn abort(&self, agent_id: &str, cascade: bool) -> std::result::Result<Vec<String>, ToolError> {
        let mut targets = vec![agent_id.to_string()];
        if cascade {
            targets.extend(
                self.org
                    .descendants_post_order(agent_id)
                    .into_iter()
                    .map(|a| a.id),
            );
        }

        let mut affected = Vec::new();
        for (i, id) in targets.iter().enumerate() {
            let is_primary = i == 0;
            let aborted = {
                let mut live = self.live.lock().expect("live lock");
                match live.get_mut(id) {
                    Some(agent) => match agent.compute_status {
                        ComputeStatus::Processing | ComputeStatus::WaitingLlm => {
                            agent.compute_status = ComputeStatus::Stopping;
                            agent.cancel.cancel();
                            agent.cancel = CancellationToken::new();
                            agent.compute_status = ComputeStatus::Stopped;
                            true
                        }
                        ComputeStatus::Idle => {
                            // Nothing in flight; still drop queued work.
                            false
                        }
                        _ => {
                            if is_primary {
                                return Err(ToolError::AlreadyStopped(id.clone()));
                            }
                            false
                        }
                    },
                    None => {
                        if is_primary {
                            return Err(ToolError::ExecutionFailed(format!(
                                "no live agent: {id}"
                            )));
                        }
                        false
                    }
                }
            };

            self.bus.abort_pending(id);
            if aborted {
                affected.push(id.clone());
                self.events.publish(RuntimeEvent::AgentAborted {
                    agent_id: id.clone(),
                });
            }
        }
        Ok(affected)
    }

    /// Atomically claim an idle agent for processing.
    ///
    /// Returns `true` when the agent was `idle` (or parked `stopped`)
    /// and is now `processing` - the single-in-flight gate.
    pub fn try_claim(&self, agent_id: &str) -> bool {
        let mut live = self.live.lock().expect("live lock");
        match live.get_mut(agent_id) {
            Some(agent) => match agent.compute_status {
                ComputeStatus::Idle => {
                    agent.compute_status = ComputeStatus::Processing;
                    true
                }
                ComputeStatus::Stopped => {
                    // stopped -> idle -> processing
                    agent.compute_status = ComputeStatus::Processing;
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    /// Validated status transition. Illegal transitions are ignored
    /// with a warning; returns whether the transition was applied.
    pub fn set_status(&self, agent_id: &str, next: ComputeStatus) -> bool {
        let mut live = self.live.lock().expect("live lock");
        match live.get_mut(agent_id) {
            Some(agent) => {
                if agent.compute_status.can_transition_to(next) {
                    agent.compute_status = next;
                    true
                } else {
                    warn!(
                        agent = %agent_id,
                        from = ?agent.compute_status,
                        to = ?next,
                        "ignoring illegal compute-status transition"
                    );
                    false
                }
            }
            None => false,
        }
    }

    /// Current compute status of a live agent.
    pub fn status(&self, agent_id: &str) -> Option<ComputeStatus> {
        let live = self.live.lock().expect("live lock");
        live.get(agent_id).map(|a| a.compute_status)
    }

    /// The agent's current cancellation token (a fresh one is installed
    /// after each abort).
    pub fn cancel_token(&self, agent_id: &str) -> Option<CancellationToken> {
        let live = self.live.lock().expect("live lock");
        live.get(agent_id).map(|a| a.cancel.clone())
    }

    /// The agent's task brief, if bound.
    pub fn brief(&self, agent_id: &str) -> Option<TaskBrief> {
        let live = self.live.lock().expect("live lock");
        live.get(agent_id).and_then(|a| a.brief.clone())
    }

    /// The workspace (task id) the agent is bound to.
    pub fn workspace_task(&self, agent_id: &str) -> Option<String> {
        let live = self.live.lock().expect("live lock");
        live.get(agent_id).and_then(|a| a.workspace_task.clone())
    }

    /// The LLM service the agent should use.
    pub fn service_id(&self, agent_id: &str) -> Option<String> {
        let live = self.live.lock().expect("live lock");
        live.get(agent_id).and_then(|a| a.service_id.clone())
    }

    /// Whether the agent is live (spawned and not terminated).
    pub fn is_live(&self, agent_id: &str) -> bool {
        self.live.lock().expect("live lock").contains_key(agent_id)
    }

    /// Ids of all live agents, sorted.
    pub fn live_agent_ids(&self) -> Vec<String> {
        let live = self.live.lock().expect("live lock");
        let mut ids: Vec<String> = live.keys().cloned().collect();
        ids.sort();
        ids
    }
}
