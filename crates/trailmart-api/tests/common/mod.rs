//! Shared wiring for trailmart-api integration tests.
//!
//! Everything runs in process: in-memory repositories, the mock inference
//! backend and an in-process bus. The consumer is built but not started;
//! tests drain the bus and call `dispatch` so effects are deterministic.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;

use trailmart_api::config::WebhookConfig;
use trailmart_api::consumers::build_consumer;
use trailmart_api::services::{
    BasketService, BusRepublishProcessor, CatalogService, IdentityService, LocalProductLookup,
    LoggingProcessor, WebhookIngestorBuilder,
};
use trailmart_api::{router, AppState};
use trailmart_core::{
    CategoryRepository, EventBus, IntegrationEvent, ProductUpsertRequest,
};
use trailmart_db::{MemoryBasketRepository, MemoryCatalog, MemoryIdentityRepository, MemoryVectorIndex};
use trailmart_inference::mock::MockInferenceBackend;
use trailmart_jobs::{ConsumerConfig, EventConsumer};
use trailmart_search::{ProductEnricher, SemanticSearch, SemanticSearchConfig};

pub const TEST_DIMENSION: usize = 64;

pub struct TestApp {
    pub catalog_repo: Arc<MemoryCatalog>,
    pub index: Arc<MemoryVectorIndex>,
    pub basket_repo: Arc<MemoryBasketRepository>,
    pub identity_repo: Arc<MemoryIdentityRepository>,
    pub backend: MockInferenceBackend,
    pub bus: EventBus,
    pub state: AppState,
    pub identity: Arc<IdentityService>,
    pub consumer: EventConsumer,
    /// Subscribed before any request, so every published event is seen.
    pub events: broadcast::Receiver<IntegrationEvent>,
    pub category_id: i64,
}

pub fn default_backend() -> MockInferenceBackend {
    MockInferenceBackend::new()
        .with_dimension(TEST_DIMENSION)
        .with_json_response(r#"["tent","camping","shelter"]"#)
        .with_text_response("A roomy three-season tent for two.")
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(default_backend(), WebhookConfig::default()).await
    }

    pub async fn with_webhook_secret(secret: &str) -> Self {
        Self::build(default_backend(), WebhookConfig::default().with_secret(secret)).await
    }

    pub async fn build(backend: MockInferenceBackend, webhook: WebhookConfig) -> Self {
        let catalog_repo = Arc::new(MemoryCatalog::new());
        let index = Arc::new(MemoryVectorIndex::new());
        let basket_repo = Arc::new(MemoryBasketRepository::new());
        let identity_repo = Arc::new(MemoryIdentityRepository::new());
        let bus = EventBus::new(64);
        let events = bus.subscribe();

        let category = catalog_repo
            .create("Shelter")
            .await
            .expect("category created");

        let enricher = Arc::new(ProductEnricher::new(
            Arc::new(backend.clone()),
            catalog_repo.clone(),
            catalog_repo.clone(),
            index.clone(),
        ));
        let search = Arc::new(SemanticSearch::new(
            enricher.clone(),
            SemanticSearchConfig::default(),
        ));
        let catalog = Arc::new(CatalogService::new(
            catalog_repo.clone(),
            catalog_repo.clone(),
            Arc::new(bus.clone()),
        ));
        let baskets = Arc::new(BasketService::new(
            basket_repo.clone(),
            Arc::new(LocalProductLookup::new(catalog_repo.clone())),
        ));
        let identity = Arc::new(IdentityService::new(identity_repo.clone()));
        let webhooks = Arc::new(
            WebhookIngestorBuilder::new(webhook)
                .with_processor(Arc::new(LoggingProcessor))
                .with_processor(Arc::new(BusRepublishProcessor::new(Arc::new(bus.clone()))))
                .build(),
        );

        let consumer = build_consumer(
            bus.clone(),
            ConsumerConfig::default().with_retry_backoff_ms(1),
            enricher.clone(),
            baskets.clone(),
            identity.clone(),
        );

        let state = AppState {
            catalog,
            baskets,
            search,
            enricher,
            webhooks,
        };

        Self {
            catalog_repo,
            index,
            basket_repo,
            identity_repo,
            backend,
            bus,
            state,
            identity,
            consumer,
            events,
            category_id: category.id,
        }
    }

    pub fn router(&self) -> axum::Router {
        router(self.state.clone())
    }

    /// Take every event published so far.
    pub fn drain_events(&mut self) -> Vec<IntegrationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Drain the bus and run each event through the consumer's handlers.
    pub async fn deliver_pending(&mut self) -> Vec<IntegrationEvent> {
        let events = self.drain_events();
        for event in &events {
            self.consumer.dispatch(event).await;
        }
        events
    }

    pub fn tent_request(&self, price: i64) -> ProductUpsertRequest {
        serde_json::from_value(tent_json(self.category_id, price)).expect("valid request")
    }
}

pub fn tent_json(category_id: i64, price: i64) -> JsonValue {
    json!({
        "name": "Tent",
        "description": "Two-person backpacking tent",
        "brand": "Ridgeline",
        "categoryId": category_id,
        "images": [{"url": "https://img.example.com/tent.jpg", "isPrimary": true}],
        "variants": [{"sku": "T1", "price": price, "stockQuantity": 5}]
    })
}

pub fn event_types(events: &[IntegrationEvent]) -> Vec<&'static str> {
    events.iter().map(IntegrationEvent::event_type).collect()
}
