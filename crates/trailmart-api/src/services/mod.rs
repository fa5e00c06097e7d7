//! Service layer for business logic.

pub mod admin_token;
pub mod basket;
pub mod catalog;
pub mod identity;
pub mod lookup;
pub mod registrar;
pub mod webhook;

pub use admin_token::AdminTokenCache;
pub use basket::BasketService;
pub use catalog::{CatalogService, ProductResponse};
pub use identity::{IdentityOutcome, IdentityService};
pub use lookup::{HttpProductLookup, LocalProductLookup};
pub use registrar::{RegistrationStatus, WebhookRegistrar};
pub use webhook::{
    BusRepublishProcessor, LoggingProcessor, WebhookEnvelope, WebhookError, WebhookIngestor,
    WebhookIngestorBuilder, WebhookProcessor,
};
