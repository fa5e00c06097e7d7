//! # trailmart-search
//!
//! Semantic search and AI enrichment for the trailmart catalog.
//!
//! This crate provides:
//! - Canonical product text and vector-index projection
//! - AI tag and rich-description generation with defensive output parsing
//! - Threshold-based semantic search with a single best-match fallback
//! - Lazy, single-flight bootstrap of the vector collection
//! - The outdoor-gear support assistant
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trailmart_search::{ProductEnricher, SemanticSearch, SemanticSearchConfig};
//!
//! let enricher = Arc::new(ProductEnricher::new(backend, products, tags, index));
//! let search = SemanticSearch::new(enricher, SemanticSearchConfig::from_env());
//! let hits = search.search("warm sleeping bag for winter").await?;
//! ```

pub mod enrichment;
pub mod prompts;
pub mod semantic;

pub use enrichment::{canonical_text, project, ProductEnricher};
pub use prompts::parse_tags;
pub use semantic::{select_matches, ScoredProduct, SemanticSearch, SemanticSearchConfig};
