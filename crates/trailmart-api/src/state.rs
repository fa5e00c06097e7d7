use std::sync::Arc;

use trailmart_search::{ProductEnricher, SemanticSearch};

use crate::services::{BasketService, CatalogService, WebhookIngestor};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub baskets: Arc<BasketService>,
    pub search: Arc<SemanticSearch>,
    pub enricher: Arc<ProductEnricher>,
    pub webhooks: Arc<WebhookIngestor>,
}
