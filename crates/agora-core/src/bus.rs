//! Message bus: per-recipient FIFO queues with delayed delivery.
//!
//! Queues are unbounded and strictly FIFO per recipient. A message with
//! a future `deliver_at` hides the whole queue until its time arrives
//! (head-of-line blocking; the simple model the runtime specifies).
//!
//! Routing rules enforced at send time:
//!
//! * the recipient must be registered (`unknown_recipient` otherwise);
//! * a user-originating message must never land on the `user` queue
//!   (`invalid_route`), so no queue ever holds a user self-loop;
//! * payloads are validated, including against the typed schema when a
//!   `message_type` is set.
//!
//! The bus exposes a [`tokio::sync::Notify`] so the scheduler can sleep
//! until new mail arrives instead of polling hot.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use agora_types::message::{Envelope, MessageType, Payload, PayloadError};
use agora_types::USER_AGENT_ID;

/// Parameters for [`MessageBus::send`].
#[derive(Debug, Clone)]
pub struct SendMessage {
    /// Sender agent id.
    pub from: String,
    /// Recipient agent id.
    pub to: String,
    /// Structured payload.
    pub payload: Payload,
    /// Task correlation id, inherited from the triggering message.
    pub task_id: Option<String>,
    /// Optional future delivery time.
    pub deliver_at: Option<DateTime<Utc>>,
    /// Optional typed category; enables schema validation.
    pub message_type: Option<MessageType>,
}

impl SendMessage {
    /// A plain text message from `from` to `to`.
    pub fn text(from: impl Into<String>, to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            payload: Payload::text(text),
            task_id: None,
            deliver_at: None,
            message_type: None,
        }
    }
}

/// Failures from bus operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BusError {
    /// The recipient is not registered.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    /// The route is forbidden (user self-loop).
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// Payload validation failed.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl BusError {
    /// Stable error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            BusError::UnknownRecipient(_) => "unknown_recipient",
            BusError::InvalidRoute(_) => "invalid_route",
            BusError::Payload(e) => e.code(),
        }
    }
}

/// Per-recipient FIFO queues with scheduled delivery and abort.
pub struct MessageBus {
    queues: Mutex<HashMap<String, VecDeque<Envelope>>>,
    notify: Notify,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// Create an empty bus with no registered recipients.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Register a recipient, creating its (empty) queue.
    pub fn register_recipient(&self, id: &str) {
        let mut queues = self.queues.lock().expect("bus lock");
        queues.entry(id.to_string()).or_default();
        debug!(recipient = %id, "registered bus recipient");
    }

    /// Unregister a recipient, dropping its queue and pending mail.
    pub fn unregister_recipient(&self, id: &str) {
        let mut queues = self.queues.lock().expect("bus lock");
        if let Some(dropped) = queues.remove(id) {
            if !dropped.is_empty() {
                warn!(
                    recipient = %id,
                    dropped = dropped.len(),
                    "unregistered recipient with pending messages"
                );
            }
        }
    }

    /// Whether a recipient is registered.
    pub fn is_registered(&self, id: &str) -> bool {
        self.queues.lock().expect("bus lock").contains_key(id)
    }

    /// Validate and enqueue a message; returns its id.
    pub fn send(&self, message: SendMessage) -> Result<Uuid, BusError> {
        if message.from == USER_AGENT_ID && message.to == USER_AGENT_ID {
            return Err(BusError::InvalidRoute(
                "user may not message itself".into(),
            ));
        }

        match message.message_type {
            Some(message_type) => message.payload.validate_typed(message_type)?,
            None => message.payload.validate()?,
        }

        let mut queues = self.queues.lock().expect("bus lock");
        let queue = queues
            .get_mut(&message.to)
            .ok_or_else(|| BusError::UnknownRecipient(message.to.clone()))?;

        let mut envelope = Envelope::new(message.from, message.to, message.payload);
        if let Some(task_id) = message.task_id {
            envelope = envelope.with_task_id(task_id);
        }
        if let Some(deliver_at) = message.deliver_at {
            envelope = envelope.with_deliver_at(deliver_at);
        }
        if let Some(message_type) = message.message_type {
            envelope = envelope.with_message_type(message_type);
        }

        let id = envelope.id;
        debug!(
            id = %id,
            from = %envelope.from,
            to = %envelope.to,
            delayed = envelope.deliver_at.is_some(),
            "enqueued message"
        );
        queue.push_back(envelope);
        drop(queues);

        self.notify.notify_waiters();
        Ok(id)
    }

    /// Dequeue the recipient's oldest message if it is deliverable now.
    ///
    /// A delayed head hides the whole queue until its `deliver_at`.
    /// Returns `None` for unregistered recipients as well.
    pub fn receive_next(&self, recipient: &str) -> Option<Envelope> {
        let mut queues = self.queues.lock().expect("bus lock");
        let queue = queues.get_mut(recipient)?;
        let deliverable = queue
            .front()
            .map(|head| head.is_deliverable(Utc::now()))
            .unwrap_or(false);
        if deliverable {
            queue.pop_front()
        } else {
            None
        }
    }

    /// Whether the recipient's head message is deliverable now.
    pub fn has_deliverable(&self, recipient: &str) -> bool {
        let queues = self.queues.lock().expect("bus lock");
        queues
            .get(recipient)
            .and_then(|q| q.front())
            .map(|head| head.is_deliverable(Utc::now()))
            .unwrap_or(false)
    }

    /// Number of pending messages for a recipient (delayed included).
    pub fn queue_depth(&self, recipient: &str) -> usize {
        let queues = self.queues.lock().expect("bus lock");
        queues.get(recipient).map(|q| q.len()).unwrap_or(0)
    }

    /// Drop all pending messages for a recipient; returns the count.
    pub fn abort_pending(&self, recipient: &str) -> usize {
        let mut queues = self.queues.lock().expect("bus lock");
        match queues.get_mut(recipient) {
            Some(queue) => {
                let dropped = queue.len();
                queue.clear();
                if dropped > 0 {
                    debug!(recipient = %recipient, dropped, "aborted pending messages");
                }
                dropped
            }
            None => 0,
        }
    }

    /// Registered recipient ids, sorted.
    pub fn recipients(&self) -> Vec<String> {
        let queues = self.queues.lock().expect("bus lock");
        let mut ids: Vec<String> = queues.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait until something is enqueued anywhere on the bus.
    pub async fn wait_for_mail(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bus_with(recipients: &[&str]) -> MessageBus {
        let bus = MessageBus::new();
        for r in recipients {
            bus.register_recipient(r);
        }
        bus
    }

    #[test]
    fn fifo_per_recipient() {
        let bus = bus_with(&["root"]);
        let id1 = bus.send(SendMessage::text("user", "root", "first")).unwrap();
        let id2 = bus.send(SendMessage::text("user", "root", "second")).unwrap();

        assert_eq!(bus.receive_next("root").unwrap().id, id1);
        assert_eq!(bus.receive_next("root").unwrap().id, id2);
        assert!(bus.receive_next("root").is_none());
    }

    #[test]
    fn unknown_recipient_rejected() {
        let bus = bus_with(&["root"]);
        let err = bus
            .send(SendMessage::text("root", "ghost", "hello"))
            .unwrap_err();
        assert_eq!(err.code(), "unknown_recipient");
    }

    #[test]
    fn user_self_loop_rejected() {
        let bus = bus_with(&["user", "root"]);
        let err = bus
            .send(SendMessage::text("user", "user", "echo"))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_route");
        assert_eq!(bus.queue_depth("user"), 0);
    }

    #[test]
    fn agent_may_message_user() {
        let bus = bus_with(&["user"]);
        bus.send(SendMessage::text("root", "user", "done")).unwrap();
        assert_eq!(bus.queue_depth("user"), 1);
    }

    #[test]
    fn quick_reply_validation_applies_on_send() {
        let bus = bus_with(&["root"]);
        let mut message = SendMessage::text("a", "root", "choose");
        message.payload.quick_replies = Some(vec!["a".into(); 11]);
        let err = bus.send(message).unwrap_err();
        assert_eq!(err.code(), "quickReplies_too_many");
    }

    #[test]
    fn typed_payload_validation_applies_on_send() {
        let bus = bus_with(&["root"]);
        let mut message = SendMessage::text("a", "root", "report");
        message.message_type = Some(MessageType::StatusReport);
        let err = bus.send(message).unwrap_err();
        assert_eq!(err.code(), "missing_parameter");
    }

    #[test]
    fn delayed_head_hides_queue() {
        let bus = bus_with(&["root"]);
        let mut delayed = SendMessage::text("a", "root", "later");
        delayed.deliver_at = Some(Utc::now() + Duration::seconds(3600));
        bus.send(delayed).unwrap();
        bus.send(SendMessage::text("a", "root", "now")).unwrap();

        // The delayed head blocks the whole queue.
        assert_eq!(bus.queue_depth("root"), 2);
        assert!(!bus.has_deliverable("root"));
        assert!(bus.receive_next("root").is_none());
    }

    #[test]
    fn past_deliver_at_is_deliverable_immediately() {
        let bus = bus_with(&["root"]);
        let mut message = SendMessage::text("a", "root", "asap");
        message.deliver_at = Some(Utc::now() - Duration::seconds(5));
        bus.send(message).unwrap();
        assert!(bus.has_deliverable("root"));
        assert!(bus.receive_next("root").is_some());
    }

    #[test]
    fn abort_pending_drops_all() {
        let bus = bus_with(&["worker"]);
        bus.send(SendMessage::text("root", "worker", "one")).unwrap();
        bus.send(SendMessage::text("root", "worker", "two")).unwrap();
        assert_eq!(bus.abort_pending("worker"), 2);
        assert_eq!(bus.queue_depth("worker"), 0);
        assert_eq!(bus.abort_pending("worker"), 0);
    }

    #[test]
    fn unregister_drops_queue() {
        let bus = bus_with(&["worker"]);
        bus.send(SendMessage::text("root", "worker", "pending"))
            .unwrap();
        bus.unregister_recipient("worker");
        assert!(!bus.is_registered("worker"));
        let err = bus
            .send(SendMessage::text("root", "worker", "after"))
            .unwrap_err();
        assert_eq!(err.code(), "unknown_recipient");
    }

    #[test]
    fn task_id_and_type_carried_on_envelope() {
        let bus = bus_with(&["worker"]);
        let mut message = SendMessage::text("root", "worker", "begin");
        message.task_id = Some("task-1".into());
        message.message_type = Some(MessageType::TaskAssignment);
        bus.send(message).unwrap();

        let envelope = bus.receive_next("worker").unwrap();
        assert_eq!(envelope.task_id.as_deref(), Some("task-1"));
        assert_eq!(envelope.message_type, Some(MessageType::TaskAssignment));
    }

    #[tokio::test]
    async fn wait_for_mail_wakes_on_send() {
        use std::sync::Arc;
        let bus = Arc::new(bus_with(&["root"]));

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.wait_for_mail().await;
            })
        };
        // Give the waiter a moment to park.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        bus.send(SendMessage::text("user", "root", "wake")).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }
}
