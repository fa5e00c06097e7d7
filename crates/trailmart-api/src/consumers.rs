//! Integration-event handlers wired into the consumer at startup.
//!
//! | Event | Handler | Lane | Effect |
//! |-------|---------|------|--------|
//! | `ProductCreated` | [`ProductCreatedHandler`] | `search` | tags, embedding, optional rich description |
//! | `ProductUpdated` | [`ProductUpdatedHandler`] | `search` | optional rich description, embedding refresh |
//! | `ProductDeleted` | [`ProductDeletedHandler`] | `search` | vector removal |
//! | `ProductPriceChanged` | [`PriceChangedHandler`] | `basket` | basket price patch |
//! | `KeycloakWebhook` | [`IdentityWebhookHandler`] | `identity` | identity upsert / login |
//!
//! Handlers never propagate errors: AI and upstream failures become
//! [`HandlerResult::Failed`] and the consumer redelivers the event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use trailmart_core::{IntegrationEvent, IntegrationEventKind, ProductEnrichment, RegistrationOutcome};
use trailmart_jobs::{
    ConsumerBuilder, ConsumerConfig, EventBus, EventConsumer, EventHandler, HandlerResult,
};
use trailmart_search::ProductEnricher;

use crate::services::{BasketService, IdentityOutcome, IdentityService};

pub const SEARCH_LANE: &str = "search";
pub const BASKET_LANE: &str = "basket";
pub const IDENTITY_LANE: &str = "identity";

fn unexpected(handler: &str, event: &IntegrationEvent) -> HandlerResult {
    HandlerResult::Skipped(format!(
        "{handler} does not handle {}",
        event.event_type()
    ))
}

/// Enriches newly created products.
pub struct ProductCreatedHandler {
    enricher: Arc<ProductEnricher>,
}

impl ProductCreatedHandler {
    pub fn new(enricher: Arc<ProductEnricher>) -> Self {
        Self { enricher }
    }
}

#[async_trait]
impl EventHandler for ProductCreatedHandler {
    fn name(&self) -> &str {
        "product_created"
    }

    fn lane(&self) -> &str {
        SEARCH_LANE
    }

    fn event_types(&self) -> &[&'static str] {
        &["ProductCreated"]
    }

    async fn handle(&self, event: &IntegrationEvent) -> HandlerResult {
        let IntegrationEventKind::ProductCreated {
            product_id,
            use_ai_generated_rich_description,
            ..
        } = &event.kind
        else {
            return unexpected(self.name(), event);
        };

        let mut product = match self.enricher.products().fetch(*product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                warn!(product_id, "Created product no longer exists");
                return HandlerResult::Skipped(format!("product {product_id} not found"));
            }
            Err(e) => return HandlerResult::Failed(e.to_string()),
        };

        match self
            .enricher
            .process_new_product(&mut product, true, *use_ai_generated_rich_description)
            .await
        {
            Ok(()) => HandlerResult::Success,
            Err(e) => HandlerResult::Failed(e.to_string()),
        }
    }
}

/// Regenerates the rich description on request and refreshes the vector.
pub struct ProductUpdatedHandler {
    enricher: Arc<ProductEnricher>,
}

impl ProductUpdatedHandler {
    pub fn new(enricher: Arc<ProductEnricher>) -> Self {
        Self { enricher }
    }
}

#[async_trait]
impl EventHandler for ProductUpdatedHandler {
    fn name(&self) -> &str {
        "product_updated"
    }

    fn lane(&self) -> &str {
        SEARCH_LANE
    }

    fn event_types(&self) -> &[&'static str] {
        &["ProductUpdated"]
    }

    async fn handle(&self, event: &IntegrationEvent) -> HandlerResult {
        let IntegrationEventKind::ProductUpdated {
            product_id,
            use_ai_generated_rich_description,
            ..
        } = &event.kind
        else {
            return unexpected(self.name(), event);
        };

        let mut product = match self.enricher.products().fetch(*product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                warn!(product_id, "Updated product no longer exists");
                return HandlerResult::Skipped(format!("product {product_id} not found"));
            }
            Err(e) => return HandlerResult::Failed(e.to_string()),
        };

        if *use_ai_generated_rich_description {
            let previous = product.rich_description.clone();
            product.is_rich_description_ai_generated = false;
            let changed = match self.enricher.generate_rich_description(&mut product).await {
                Ok(changed) => changed,
                Err(e) => return HandlerResult::Failed(e.to_string()),
            };
            if let (true, Some(text)) = (changed, &product.rich_description) {
                let enrichment =
                    ProductEnrichment::new(product.id).with_rich_description(text.clone(), previous);
                if let Err(e) = self.enricher.products().save_enrichment(&enrichment).await {
                    return HandlerResult::Failed(e.to_string());
                }
            }
        }

        match self.enricher.generate_embedding(&product).await {
            Ok(()) => HandlerResult::Success,
            Err(e) => HandlerResult::Failed(e.to_string()),
        }
    }
}

/// Drops the vector of a deleted product.
pub struct ProductDeletedHandler {
    enricher: Arc<ProductEnricher>,
}

impl ProductDeletedHandler {
    pub fn new(enricher: Arc<ProductEnricher>) -> Self {
        Self { enricher }
    }
}

#[async_trait]
impl EventHandler for ProductDeletedHandler {
    fn name(&self) -> &str {
        "product_deleted"
    }

    fn lane(&self) -> &str {
        SEARCH_LANE
    }

    fn event_types(&self) -> &[&'static str] {
        &["ProductDeleted"]
    }

    async fn handle(&self, event: &IntegrationEvent) -> HandlerResult {
        let IntegrationEventKind::ProductDeleted { product_id } = &event.kind else {
            return unexpected(self.name(), event);
        };

        let index = self.enricher.index();
        match index.collection_exists().await {
            Ok(true) => {}
            Ok(false) => return HandlerResult::Skipped("vector collection not created".to_string()),
            Err(e) => return HandlerResult::Failed(e.to_string()),
        }

        match index.delete(*product_id).await {
            Ok(()) => HandlerResult::Success,
            Err(e) => HandlerResult::Failed(e.to_string()),
        }
    }
}

/// Patches cached basket prices.
pub struct PriceChangedHandler {
    baskets: Arc<BasketService>,
}

impl PriceChangedHandler {
    pub fn new(baskets: Arc<BasketService>) -> Self {
        Self { baskets }
    }
}

#[async_trait]
impl EventHandler for PriceChangedHandler {
    fn name(&self) -> &str {
        "basket_price_changed"
    }

    fn lane(&self) -> &str {
        BASKET_LANE
    }

    fn event_types(&self) -> &[&'static str] {
        &["ProductPriceChanged"]
    }

    async fn handle(&self, event: &IntegrationEvent) -> HandlerResult {
        let IntegrationEventKind::ProductPriceChanged {
            product_id, price, ..
        } = &event.kind
        else {
            return unexpected(self.name(), event);
        };

        match self.baskets.apply_price_change(*product_id, *price).await {
            Ok(0) => HandlerResult::Skipped("no cached basket holds the product".to_string()),
            Ok(_) => HandlerResult::Success,
            Err(e) => HandlerResult::Failed(e.to_string()),
        }
    }
}

/// Applies republished identity-provider webhooks.
pub struct IdentityWebhookHandler {
    identity: Arc<IdentityService>,
}

impl IdentityWebhookHandler {
    pub fn new(identity: Arc<IdentityService>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl EventHandler for IdentityWebhookHandler {
    fn name(&self) -> &str {
        "identity_webhook"
    }

    fn lane(&self) -> &str {
        IDENTITY_LANE
    }

    fn event_types(&self) -> &[&'static str] {
        &["KeycloakWebhook"]
    }

    async fn handle(&self, event: &IntegrationEvent) -> HandlerResult {
        let IntegrationEventKind::KeycloakWebhook {
            keycloak_event_type,
            realm_id,
            raw_payload,
            ..
        } = &event.kind
        else {
            return unexpected(self.name(), event);
        };

        let outcome = self
            .identity
            .handle_webhook(keycloak_event_type, realm_id.as_deref(), raw_payload)
            .await;

        match outcome {
            Ok(IdentityOutcome::Registered(RegistrationOutcome::Duplicate)) => {
                HandlerResult::Skipped("duplicate event uid".to_string())
            }
            Ok(IdentityOutcome::Ignored(kind)) => {
                HandlerResult::Skipped(format!("event type {kind} ignored"))
            }
            Ok(IdentityOutcome::Malformed(reason)) => HandlerResult::Skipped(reason),
            Ok(_) => HandlerResult::Success,
            Err(e) => HandlerResult::Failed(e.to_string()),
        }
    }
}

/// Build the consumer with the fixed handler list.
pub fn build_consumer(
    bus: EventBus,
    config: ConsumerConfig,
    enricher: Arc<ProductEnricher>,
    baskets: Arc<BasketService>,
    identity: Arc<IdentityService>,
) -> EventConsumer {
    ConsumerBuilder::new(bus)
        .with_config(config)
        .with_handler(ProductCreatedHandler::new(enricher.clone()))
        .with_handler(ProductUpdatedHandler::new(enricher.clone()))
        .with_handler(ProductDeletedHandler::new(enricher))
        .with_handler(PriceChangedHandler::new(baskets))
        .with_handler(IdentityWebhookHandler::new(identity))
        .build()
}
