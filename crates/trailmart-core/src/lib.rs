//! # trailmart-core
//!
//! Core types, traits, and abstractions for the trailmart services.
//!
//! This crate provides the domain model (products, carts, identity users),
//! the integration-event contract shared by every service, and the
//! repository and inference traits the other crates implement.

pub mod defaults;
pub mod error;
pub mod events;
pub mod identity;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, EventPublisher, IntegrationEvent, IntegrationEventKind};
pub use identity::{AuthDetails, IdentityEvent, KeycloakEventPayload};
pub use models::*;
pub use traits::*;
