//! Gatehouse event bus and notification infrastructure.
//!
//! Building blocks for post-transition notifications:
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`VisitEvent`] — the canonical visit domain event envelope.
//! - [`WebhookDelivery`] — best-effort external delivery with retry.
//! - [`NotificationDispatcher`] — background consumer that forwards every
//!   event to the configured webhook endpoint.
//!
//! Notification delivery is fire-and-forget by design: a failed delivery is
//! logged and dropped, never rolled back into the transition that caused it.

pub mod bus;
pub mod dispatcher;
pub mod webhook;

pub use bus::{EventBus, VisitEvent};
pub use dispatcher::NotificationDispatcher;
pub use webhook::WebhookDelivery;
