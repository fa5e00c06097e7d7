//! # trailmart-inference
//!
//! Embedding and chat backends behind the `trailmart_core` inference traits.
//!
//! This crate provides:
//! - Ollama implementation (default, feature `ollama`)
//! - Reasoning-block (`<think>...</think>`) stripping for chat output
//! - A deterministic mock backend (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use trailmart_inference::OllamaBackend;
//! use trailmart_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let texts = vec!["lightweight tent".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod thinking;

#[cfg(feature = "ollama")]
pub mod ollama;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

pub use thinking::{split_thinking, strip_thinking, ThinkingResponse};
