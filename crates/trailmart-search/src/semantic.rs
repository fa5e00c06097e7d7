//! Threshold-based semantic product search with a best-match fallback.
//!
//! The vector collection is bootstrapped lazily: the first search that
//! finds no collection runs a full reindex of the catalog. Initialization
//! is serialized behind an async mutex with a double-checked flag, so
//! concurrent first searches trigger exactly one reindex. A failed
//! initialization leaves the flag unset and the next search retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use trailmart_core::defaults::{SEARCH_THRESHOLD, SEARCH_TOP_N};
use trailmart_core::{Error, Product, Result, VectorMatch};

use crate::enrichment::{canonical_text, project, ProductEnricher};

/// Products embedded per backend call during a full reindex.
const REINDEX_BATCH_SIZE: usize = 32;

/// Search tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticSearchConfig {
    /// Nearest neighbours fetched from the index.
    pub top_n: usize,
    /// Minimum cosine similarity for a hit to be kept.
    pub threshold: f32,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            top_n: SEARCH_TOP_N,
            threshold: SEARCH_THRESHOLD,
        }
    }
}

impl SemanticSearchConfig {
    /// Read defaults from `SEARCH_TOP_N` and `SEARCH_THRESHOLD`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("SEARCH_TOP_N")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.top_n = n;
        }
        if let Some(t) = std::env::var("SEARCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.threshold = t;
        }
        config
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// A hydrated search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProduct {
    #[serde(flatten)]
    pub product: Product,
    pub score: f32,
}

/// Keep hits at or above `threshold`; if none qualify, keep the single best hit.
///
/// `hits` must be ordered best first. Duplicate product ids keep their
/// first (best) occurrence. The result is empty only when `hits` is.
pub fn select_matches(hits: Vec<VectorMatch>, threshold: f32) -> Vec<VectorMatch> {
    let mut kept: Vec<VectorMatch> = Vec::with_capacity(hits.len());
    for hit in hits.iter().filter(|h| h.score >= threshold) {
        if !kept.iter().any(|k| k.product_id == hit.product_id) {
            kept.push(*hit);
        }
    }
    if kept.is_empty() {
        kept.extend(hits.first().copied());
    }
    kept
}

/// Semantic search over the product vector index.
pub struct SemanticSearch {
    enricher: Arc<ProductEnricher>,
    config: SemanticSearchConfig,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

impl SemanticSearch {
    pub fn new(enricher: Arc<ProductEnricher>, config: SemanticSearchConfig) -> Self {
        Self {
            enricher,
            config,
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> SemanticSearchConfig {
        self.config
    }

    /// Bootstrap the collection with a full reindex if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.enricher.index().collection_exists().await? {
            info!(
                subsystem = "search",
                component = "semantic",
                op = "lazy_init",
                "Vector collection missing, running full reindex"
            );
            self.reindex_all().await?;
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Embed every catalog product and upsert all vectors.
    ///
    /// Returns the number of products indexed.
    #[instrument(skip(self), fields(subsystem = "search", component = "semantic", op = "reindex_all"))]
    pub async fn reindex_all(&self) -> Result<usize> {
        let start = Instant::now();
        let backend = self.enricher.backend();
        let index = self.enricher.index();

        index.ensure_collection(backend.dimension()).await?;
        let products = self.enricher.products().list().await?;

        for batch in products.chunks(REINDEX_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(canonical_text).collect();
            let embeddings = backend.embed_texts(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            for (product, embedding) in batch.iter().zip(embeddings) {
                index.upsert(project(product, embedding)).await?;
            }
        }

        info!(
            result_count = products.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Reindex complete"
        );
        Ok(products.len())
    }

    /// Search with the configured top-n and threshold.
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredProduct>> {
        self.search_with(query, self.config.top_n, self.config.threshold)
            .await
    }

    /// Search with explicit top-n and threshold.
    ///
    /// Results come back in similarity order. The list is non-empty
    /// whenever the index holds at least one vector whose product still
    /// exists.
    #[instrument(skip(self, query), fields(subsystem = "search", component = "semantic", op = "search", query = %query))]
    pub async fn search_with(
        &self,
        query: &str,
        top_n: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredProduct>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        if top_n == 0 {
            return Err(Error::Validation("top_n must be at least 1".to_string()));
        }

        let start = Instant::now();
        self.ensure_index().await?;

        let embedding = self
            .enricher
            .backend()
            .embed_texts(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Backend returned no embedding".to_string()))?;

        let hits = self.enricher.index().search(&embedding, top_n).await?;
        let candidate_count = hits.len();
        let matches = select_matches(hits, threshold);
        if candidate_count > 0 && matches.len() == 1 && matches[0].score < threshold {
            debug!(
                score = matches[0].score,
                "No hit cleared the threshold, using best match"
            );
        }

        let results = self.hydrate(&matches).await?;

        info!(
            result_count = results.len(),
            candidate_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Semantic search complete"
        );
        Ok(results)
    }

    /// Load products for `matches`, preserving match order.
    async fn hydrate(&self, matches: &[VectorMatch]) -> Result<Vec<ScoredProduct>> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = matches.iter().map(|m| m.product_id).collect();
        let mut by_id: HashMap<i64, Product> = self
            .enricher
            .products()
            .fetch_many(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            match by_id.remove(&m.product_id) {
                Some(product) => results.push(ScoredProduct {
                    product,
                    score: m.score,
                }),
                None => warn!(
                    product_id = m.product_id,
                    "Vector references a missing product"
                ),
            }
        }
        Ok(results)
    }
}
