//! # trailmart-jobs
//!
//! Integration event consumers for trailmart.
//!
//! This crate provides:
//! - The [`EventHandler`] trait implemented by every asynchronous consumer
//! - A statically-wired consumer that runs one task per handler lane
//! - Lifecycle notifications via broadcast channels
//! - Graceful shutdown that cancels in-flight handlers
//!
//! Failed handlers are retried with backoff up to `CONSUMER_MAX_RETRIES`
//! times, then the event is dead-lettered for that handler and logged.
//!
//! ## Example
//!
//! ```ignore
//! use trailmart_core::EventBus;
//! use trailmart_jobs::{ConsumerBuilder, ConsumerConfig};
//!
//! let bus = EventBus::new(256);
//!
//! let consumer = ConsumerBuilder::new(bus.clone())
//!     .with_config(ConsumerConfig::from_env())
//!     .with_handler(price_sync_handler)
//!     .with_handler(identity_handler)
//!     .build();
//!
//! let handle = consumer.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod consumer;
pub mod handler;

// Re-export core types
pub use trailmart_core::*;

pub use consumer::{ConsumerBuilder, ConsumerConfig, ConsumerEvent, ConsumerHandle, EventConsumer};
pub use handler::{EventHandler, HandlerResult, NoOpHandler};
