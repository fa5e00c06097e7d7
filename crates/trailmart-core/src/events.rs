//! Integration events and the in-process event bus.
//!
//! Every fact one service publishes for another travels as an
//! [`IntegrationEvent`]: a unique id, a UTC timestamp, and an `eventType`
//! discriminator flattened next to the variant fields.
//!
//! ## Wire Format
//!
//! ```text
//! {"eventId":"0195...","occurredOn":"2026-01-01T00:00:00Z","eventType":"ProductPriceChanged",
//!  "productId":7,"name":"Tent","description":"...","price":120.0,"imageUrl":"tent.jpg"}
//! ```
//!
//! ## Delivery
//!
//! Delivery is at-least-once and unordered across producers. Consumers must
//! tolerate replays and must not assume `ProductCreated` precedes a later
//! `ProductUpdated` for the same product.
//!
//! The bus has two kinds of subscription. [`EventBus::subscribe_queue`]
//! returns an unbounded queue that never drops an event; consumers that
//! apply side effects use it. [`EventBus::subscribe`] returns a bounded
//! broadcast receiver for observers that may lag.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::error::Result;

// ============================================================================
// Envelope
// ============================================================================

/// Immutable fact published by one service and consumed by others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// When the event occurred (UTC).
    pub occurred_on: DateTime<Utc>,
    /// Variant fields, discriminated by `eventType`.
    #[serde(flatten)]
    pub kind: IntegrationEventKind,
}

impl IntegrationEvent {
    /// Wrap a payload with a fresh id and the current time.
    pub fn new(kind: IntegrationEventKind) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            occurred_on: Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Product this event concerns, if any.
    pub fn product_id(&self) -> Option<i64> {
        match &self.kind {
            IntegrationEventKind::ProductCreated { product_id, .. }
            | IntegrationEventKind::ProductUpdated { product_id, .. }
            | IntegrationEventKind::ProductPriceChanged { product_id, .. }
            | IntegrationEventKind::ProductDeleted { product_id } => Some(*product_id),
            IntegrationEventKind::KeycloakWebhook { .. } => None,
        }
    }
}

/// Concrete integration event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum IntegrationEventKind {
    /// A product was committed to the catalog.
    #[serde(rename_all = "camelCase")]
    ProductCreated {
        product_id: i64,
        name: String,
        brand: String,
        description: String,
        base_price: Decimal,
        #[serde(rename = "useAIGeneratedRichDescription")]
        use_ai_generated_rich_description: bool,
    },
    /// A product was updated (published on every update).
    #[serde(rename_all = "camelCase")]
    ProductUpdated {
        product_id: i64,
        name: String,
        brand: String,
        description: String,
        base_price: Decimal,
        #[serde(rename = "useAIGeneratedRichDescription")]
        use_ai_generated_rich_description: bool,
    },
    /// The derived display price of a product changed.
    #[serde(rename_all = "camelCase")]
    ProductPriceChanged {
        product_id: i64,
        name: String,
        description: String,
        price: Decimal,
        /// Primary image URL, empty when the product has no images.
        image_url: String,
    },
    /// A product was hard-deleted from the catalog.
    #[serde(rename_all = "camelCase")]
    ProductDeleted { product_id: i64 },
    /// A verified identity-provider webhook, republished for internal consumers.
    #[serde(rename_all = "camelCase")]
    KeycloakWebhook {
        /// Provider event type as received (e.g. `REGISTER`, `access.LOGIN`).
        keycloak_event_type: String,
        user_id: Option<String>,
        realm_id: Option<String>,
        /// Exact body bytes as UTF-8; typed parsing happens in the consumer.
        raw_payload: String,
        /// Lower-cased header snapshot taken at ingestion.
        headers: BTreeMap<String, String>,
        /// Parsed JSON document.
        payload: JsonValue,
    },
}

impl IntegrationEventKind {
    /// Discriminator as written on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ProductCreated { .. } => "ProductCreated",
            Self::ProductUpdated { .. } => "ProductUpdated",
            Self::ProductPriceChanged { .. } => "ProductPriceChanged",
            Self::ProductDeleted { .. } => "ProductDeleted",
            Self::KeycloakWebhook { .. } => "KeycloakWebhook",
        }
    }
}

// ============================================================================
// Publishing
// ============================================================================

/// Outbound side of the message bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event. Returning `Ok` means the bus accepted it.
    async fn publish(&self, event: IntegrationEvent) -> Result<()>;
}

/// In-process integration event bus.
///
/// Queue subscribers receive every event published after they subscribed.
/// Broadcast subscribers that fall more than `capacity` events behind
/// observe `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntegrationEvent>,
    queues: Arc<Mutex<Vec<mpsc::UnboundedSender<IntegrationEvent>>>>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            queues: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe a lossy observer to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.tx.subscribe()
    }

    /// Subscribe a lossless queue to events published after this call.
    ///
    /// Dropping the receiver unsubscribes it on the next publish.
    pub fn subscribe_queue(&self) -> mpsc::UnboundedReceiver<IntegrationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Returns the number of active subscribers of both kinds.
    pub fn subscriber_count(&self) -> usize {
        let queues = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|q| !q.is_closed())
            .count();
        self.tx.receiver_count() + queues
    }

    /// Hand `event` to every subscriber, pruning closed queues.
    ///
    /// Returns how many subscribers received it. Zero is logged as a warning.
    pub fn deliver(&self, event: IntegrationEvent) -> usize {
        let queued = {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            queues.retain(|q| q.send(event.clone()).is_ok());
            queues.len()
        };
        let event_type = event.event_type();
        let event_id = event.event_id;
        let observers = self.tx.send(event).unwrap_or(0);

        if queued + observers == 0 {
            tracing::warn!(
                event_type,
                %event_id,
                "EventBus publish with no subscribers, event dropped"
            );
        } else {
            tracing::debug!(event_type, %event_id, queued, observers, "EventBus publish");
        }
        queued + observers
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: IntegrationEvent) -> Result<()> {
        self.deliver(event);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn price_changed() -> IntegrationEvent {
        IntegrationEvent::new(IntegrationEventKind::ProductPriceChanged {
            product_id: 7,
            name: "Tent".to_string(),
            description: "Two-person tent".to_string(),
            price: Decimal::from(120),
            image_url: String::new(),
        })
    }

    #[test]
    fn test_wire_shape_is_flat_camel_case() {
        let json = serde_json::to_value(price_changed()).unwrap();
        assert_eq!(json["eventType"], "ProductPriceChanged");
        assert_eq!(json["productId"], 7);
        assert_eq!(json["imageUrl"], "");
        assert!(json["eventId"].is_string());
        assert!(json["occurredOn"].is_string());
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_created_uses_ai_flag_name() {
        let event = IntegrationEvent::new(IntegrationEventKind::ProductCreated {
            product_id: 1,
            name: "Tent".into(),
            brand: "Ridge".into(),
            description: "d".into(),
            base_price: Decimal::from(100),
            use_ai_generated_rich_description: true,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["useAIGeneratedRichDescription"], true);
        assert_eq!(json["basePrice"].as_f64(), Some(100.0));
    }

    #[test]
    fn test_deserialize_from_wire() {
        let raw = r#"{
            "eventId": "01957a9e-5d3c-7c8a-9c1e-0a1b2c3d4e5f",
            "occurredOn": "2026-01-01T10:00:00Z",
            "eventType": "ProductDeleted",
            "productId": 9
        }"#;
        let event: IntegrationEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, IntegrationEventKind::ProductDeleted { product_id: 9 });
        assert_eq!(event.product_id(), Some(9));
    }

    #[test]
    fn test_webhook_event_has_no_product() {
        let event = IntegrationEvent::new(IntegrationEventKind::KeycloakWebhook {
            keycloak_event_type: "REGISTER".into(),
            user_id: Some("u1".into()),
            realm_id: None,
            raw_payload: "{}".into(),
            headers: BTreeMap::new(),
            payload: JsonValue::Null,
        });
        assert_eq!(event.event_type(), "KeycloakWebhook");
        assert_eq!(event.product_id(), None);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = price_changed();
        let b = price_changed();
        assert_ne!(a.event_id, b.event_id);
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        let event = price_changed();
        bus.publish(event.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(price_changed()).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().event_type(), "ProductPriceChanged");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "ProductPriceChanged");
    }

    #[tokio::test]
    async fn test_queue_subscriber_never_lags() {
        let bus = EventBus::new(2);
        let mut queue = bus.subscribe_queue();
        let mut observer = bus.subscribe();

        for _ in 0..10 {
            bus.publish(price_changed()).await.unwrap();
        }

        let mut received = 0;
        while queue.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 10);
        assert!(matches!(
            observer.recv().await,
            Err(broadcast::error::RecvError::Lagged(8))
        ));
    }

    #[tokio::test]
    async fn test_dropped_queue_is_unsubscribed() {
        let bus = EventBus::new(8);
        let queue = bus.subscribe_queue();
        assert_eq!(bus.subscriber_count(), 1);

        drop(queue);
        bus.publish(price_changed()).await.unwrap();
        assert_eq!(bus.queues.lock().unwrap().len(), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_is_ok() {
        let bus = EventBus::new(32);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.publish(price_changed()).await.is_ok());
    }

    #[test]
    fn test_deliver_counts_both_subscriber_kinds() {
        let bus = EventBus::new(8);
        assert_eq!(bus.deliver(price_changed()), 0);

        let _observer = bus.subscribe();
        assert_eq!(bus.deliver(price_changed()), 1);

        let queue = bus.subscribe_queue();
        assert_eq!(bus.deliver(price_changed()), 2);

        drop(queue);
        assert_eq!(bus.deliver(price_changed()), 1);
    }
}
