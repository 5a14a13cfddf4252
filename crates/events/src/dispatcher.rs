//! Event-to-notification dispatch loop.
//!
//! [`NotificationDispatcher`] subscribes to the event bus and forwards each
//! event to the configured webhook endpoint. Delivery is best-effort:
//! failures are logged and never fed back into the workflow engine.

use tokio::sync::broadcast;

use crate::bus::VisitEvent;
use crate::webhook::WebhookDelivery;

/// Forwards visit events to an external notification endpoint.
pub struct NotificationDispatcher {
    webhook_url: Option<String>,
    delivery: WebhookDelivery,
}

impl NotificationDispatcher {
    /// Create a dispatcher. With no webhook URL configured the dispatcher
    /// still drains the bus and logs each event, so in-process subscribers
    /// never lag behind a full channel.
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            delivery: WebhookDelivery::new(),
        }
    }

    /// Run the dispatch loop until the bus is closed.
    pub async fn run(self, mut receiver: broadcast::Receiver<VisitEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.dispatch(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification dispatcher shutting down");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, event: &VisitEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            visit_id = event.visit_id,
            "Dispatching visit event"
        );

        let Some(url) = &self.webhook_url else {
            return;
        };

        // Best-effort: the transition already committed, so a delivery
        // failure is logged inside `deliver` and otherwise dropped.
        let _ = self.delivery.deliver(url, event).await;
    }
}
