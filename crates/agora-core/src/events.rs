//! Runtime event stream.
//!
//! User-visible happenings (retries, final LLM failures, agent
//! lifecycle changes, handler faults) are published on a broadcast
//! channel so the UI layer can subscribe without reaching into the
//! runtime's internals. Publishing never blocks; with no subscribers
//! events are dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the broadcast ring buffer.
const EVENT_CAPACITY: usize = 256;

/// One user-visible runtime event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An agent was spawned.
    AgentSpawned {
        agent_id: String,
        role_id: String,
        parent_id: String,
    },
    /// An agent (and its subtree) was terminated.
    AgentTerminated {
        agent_id: String,
        reason: Option<String>,
    },
    /// An agent's in-flight work was aborted.
    AgentAborted { agent_id: String },
    /// A transient LLM failure scheduled a retry.
    LlmRetry {
        agent_id: Option<String>,
        service: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// An LLM call failed for good.
    LlmFailure {
        agent_id: Option<String>,
        service: String,
        code: String,
        error: String,
    },
    /// An agent hit the tool-round bound for one inbound message.
    ToolRoundsExceeded { agent_id: String, rounds: u32 },
    /// An agent's message handler failed or panicked.
    ProcessingFailed { agent_id: String, error: String },
}

/// Broadcast fan-out for [`RuntimeEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an event bus with the default buffer capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Never blocks; dropped when nobody listens.
    pub fn publish(&self, event: RuntimeEvent) {
        debug!(event = ?event, "runtime event");
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(RuntimeEvent::AgentAborted {
            agent_id: "agent-1".into(),
        });
        match rx.recv().await.unwrap() {
            RuntimeEvent::AgentAborted { agent_id } => assert_eq!(agent_id, "agent-1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(RuntimeEvent::ProcessingFailed {
            agent_id: "agent-1".into(),
            error: "boom".into(),
        });
    }

    #[test]
    fn events_serialize_tagged() {
        let event = RuntimeEvent::ToolRoundsExceeded {
            agent_id: "agent-2".into(),
            rounds: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_rounds_exceeded""#));
        assert!(json.contains(r#""rounds":12"#));
    }
}
