//! Best-effort domain event publishing over NATS.
//!
//! Subscribers (the confirmation mailer among them) react to `sent` and
//! `status_changed`. A failed publish is logged and never fails the operation
//! that raised the event.

use crate::domain::events::PoEvent;

#[derive(Clone)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
    prefix: String,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>, prefix: impl Into<String>) -> Self {
        Self { nats, prefix: prefix.into() }
    }

    /// Bus that drops every event; used when no NATS server is configured.
    pub fn disabled() -> Self {
        Self::new(None, "dealer_po")
    }

    pub fn subject(&self, event: &PoEvent) -> String {
        format!("{}.{}", self.prefix, event.name())
    }

    pub async fn publish(&self, event: PoEvent) {
        let Some(client) = &self.nats else {
            tracing::debug!(event = event.name(), "no event bus configured, dropping event");
            return;
        };
        let subject = self.subject(&event);
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(%subject, error = %e, "failed to publish event");
        }
    }
}
