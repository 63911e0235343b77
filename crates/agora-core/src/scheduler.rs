//! The bus-driving scheduler.
//!
//! A single logical loop scans live agents whose compute status is
//! `idle` and whose queue head is deliverable, claims each through the
//! `idle -> processing` gate (the single-in-flight guarantee), and
//! dispatches a worker task bounded by a concurrency semaphore. Each
//! worker delivers exactly one message to the [`LlmHandler`] and then
//! returns the agent to `idle`.
//!
//! A panic or error inside one agent's handler is caught at this
//! boundary: the failure is logged and published, a `status_report` is
//! routed to the agent's parent, and the agent goes back to `idle`
//! unless it was terminated meanwhile.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use agora_types::message::{MessageType, Payload};
use agora_types::org::{ComputeStatus, USER_AGENT_ID};

use crate::agents::AgentManager;
use crate::bus::{MessageBus, SendMessage};
use crate::events::{EventBus, RuntimeEvent};
use crate::handler::LlmHandler;

/// Idle backoff when no agent has deliverable mail (delayed messages
/// become deliverable without a bus notification).
const IDLE_TICK: Duration = Duration::from_millis(50);

/// Drives the bus: scans for ready agents and dispatches workers.
pub struct MessageProcessor {
    bus: Arc<MessageBus>,
    agents: Arc<AgentManager>,
    handler: Arc<LlmHandler>,
    events: EventBus,
    pool: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl MessageProcessor {
    /// Create a processor with a worker pool of `max_concurrent_agents`.
    pub fn new(
        bus: Arc<MessageBus>,
        agents: Arc<AgentManager>,
        handler: Arc<LlmHandler>,
        events: EventBus,
        max_concurrent_agents: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bus,
            agents,
            handler,
            events,
            pool: Arc::new(Semaphore::new(max_concurrent_agents.max(1))),
            cancel,
        }
    }

    /// Run the scheduler loop until the cancellation token fires.
    ///
    /// Workers already dispatched are allowed to finish; the caller
    /// owns the grace period.
    pub async fn run(&self) {
        info!("message processor started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let dispatched = self.dispatch_ready().await;
            if dispatched == 0 {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = self.bus.wait_for_mail() => {}
                    _ = tokio::time::sleep(IDLE_TICK) => {}
                }
            }
        }
        info!("message processor stopped");
    }

    /// Scan once and dispatch a worker for every claimable agent.
    /// Returns how many workers were started.
    async fn dispatch_ready(&self) -> usize {
        let mut dispatched = 0;
        for agent_id in self.agents.live_agent_ids() {
            // The user endpoint is drained by the outer API, not here.
            if agent_id == USER_AGENT_ID {
                continue;
            }
            if !self.bus.has_deliverable(&agent_id) {
                continue;
            }
            if self.agents.status(&agent_id) != Some(ComputeStatus::Idle)
                && self.agents.status(&agent_id) != Some(ComputeStatus::Stopped)
            {
                continue;
            }

            // Respect the pool before claiming, so a claimed agent is
            // never left parked in `processing` waiting for a slot.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = self.pool.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if !self.agents.try_claim(&agent_id) {
                // Lost the race with another transition.
                drop(permit);
                continue;
            }

            dispatched += 1;
            let bus = self.bus.clone();
            let agents = self.agents.clone();
            let handler = self.handler.clone();
            let events = self.events.clone();
            let id = agent_id.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let Some(envelope) = bus.receive_next(&id) else {
                    // The head was consumed or expired between the scan
                    // and the claim; just release the agent.
                    agents.set_status(&id, ComputeStatus::Idle);
                    return;
                };

                debug!(agent = %id, message = %envelope.id, "worker delivering message");
                let task_id = envelope.task_id.clone();

                let outcome = std::panic::AssertUnwindSafe(handler.handle(&id, envelope))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(agent = %id, error = %e, "message handler failed");
                        report_failure(&bus, &events, &agents, &id, task_id, e.to_string());
                    }
                    Err(_) => {
                        error!(agent = %id, "message handler panicked");
                        report_failure(
                            &bus,
                            &events,
                            &agents,
                            &id,
                            task_id,
                            "internal handler panic".to_string(),
                        );
                    }
                }

                // Back to idle unless terminated (or freshly stopped).
                agents.set_status(&id, ComputeStatus::Idle);
            });
        }
        dispatched
    }
}

/// Publish a processing failure and route a status report to the
/// failed agent's parent.
fn report_failure(
    bus: &MessageBus,
    events: &EventBus,
    agents: &AgentManager,
    agent_id: &str,
    task_id: Option<String>,
    error: String,
) {
    events.publish(RuntimeEvent::ProcessingFailed {
        agent_id: agent_id.to_string(),
        error: error.clone(),
    });

    let parent = agents
        .org()
        .get_agent(agent_id)
        .and_then(|a| a.parent_id)
        .unwrap_or_else(|| USER_AGENT_ID.to_string());

    let mut payload = Payload::text(format!(
        "Agent {agent_id} failed while processing a message: {error}"
    ));
    payload.extra.insert(
        "status".into(),
        serde_json::Value::String("error".into()),
    );
    payload.extra.insert(
        "error".into(),
        serde_json::Value::String("agent_message_processing_failed".into()),
    );

    let _ = bus.send(SendMessage {
        from: agent_id.to_string(),
        to: parent,
        payload,
        task_id,
        deliver_at: None,
        message_type: Some(MessageType::StatusReport),
    });
}
