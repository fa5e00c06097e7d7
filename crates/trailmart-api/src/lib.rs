//! # trailmart-api
//!
//! Services, integration event consumers, and the HTTP surface of trailmart.
//!
//! The binary in `main.rs` wires these together against PostgreSQL, Redis
//! and Ollama. Tests wire the same pieces against the in-memory
//! repositories and the mock inference backend.

pub mod config;
pub mod consumers;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{KeycloakConfig, ServerConfig, WebhookConfig};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
