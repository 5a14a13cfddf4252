//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`VisitEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use gatehouse_core::types::DbId;

// ---------------------------------------------------------------------------
// VisitEvent
// ---------------------------------------------------------------------------

/// A visit lifecycle event, published after every accepted transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEvent {
    /// Dot-separated event name, e.g. `"visit.approved"`.
    pub event_type: String,

    /// The visit the transition applied to.
    pub visit_id: DbId,

    /// Id of the user that triggered the transition, when one exists
    /// (sweep-triggered transitions have no actor).
    pub actor_user_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl VisitEvent {
    /// Create a new event for a visit.
    pub fn new(event_type: impl Into<String>, visit_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            visit_id,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the acting user to the event.
    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`VisitEvent`].
pub struct EventBus {
    sender: broadcast::Sender<VisitEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// notification delivery is best-effort.
    pub fn publish(&self, event: VisitEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<VisitEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_receives_published_events() {
        let bus = EventBus::default();
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        bus.publish(
            VisitEvent::new("visit.approved", 7)
                .with_actor(11)
                .with_payload(serde_json::json!({ "step": 0 })),
        );

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a.event_type, "visit.approved");
        assert_eq!(a.visit_id, 7);
        assert_eq!(a.actor_user_id, Some(11));
        assert_eq!(b.event_type, "visit.approved");
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.publish(VisitEvent::new("visit.cancelled", 1));
    }
}
