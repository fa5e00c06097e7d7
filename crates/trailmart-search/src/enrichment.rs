//! AI enrichment of catalog products: tags, embeddings, rich descriptions,
//! and the customer support assistant.
//!
//! Every step here is best-effort from the catalog's point of view. Callers
//! in the event consumers log failures and move on; the relational product
//! is only written through [`ProductRepository::save_enrichment`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use trailmart_core::{
    Error, InferenceBackend, Product, ProductEnrichment, ProductRepository, ProductTag,
    ProductVector, Result, TagRepository, VectorIndex,
};
use trailmart_inference::strip_thinking;

use crate::prompts::{
    parse_tags, rich_description_prompt, tag_prompt, RICH_DESCRIPTION_SYSTEM_PROMPT,
    SUPPORT_SYSTEM_PROMPT, TAG_SYSTEM_PROMPT,
};

/// Text embedded for a product: name, description and tag names.
pub fn canonical_text(product: &Product) -> String {
    let tags = product
        .tags
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {} {}", product.name, product.description, tags)
}

/// Build the vector-index projection of a product.
pub fn project(product: &Product, embedding: trailmart_core::Vector) -> ProductVector {
    ProductVector {
        product_id: product.id,
        name: product.name.clone(),
        description: product.description.clone(),
        brand: product.brand.clone(),
        price: product.base_price,
        primary_image_url: product.primary_image_url().map(str::to_string),
        embedding,
    }
}

/// Enrichment pipeline over an inference backend and the catalog stores.
#[derive(Clone)]
pub struct ProductEnricher {
    backend: Arc<dyn InferenceBackend>,
    products: Arc<dyn ProductRepository>,
    tags: Arc<dyn TagRepository>,
    index: Arc<dyn VectorIndex>,
}

impl ProductEnricher {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        products: Arc<dyn ProductRepository>,
        tags: Arc<dyn TagRepository>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            backend,
            products,
            tags,
            index,
        }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn products(&self) -> &Arc<dyn ProductRepository> {
        &self.products
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Embed the product's canonical text and upsert its projection.
    ///
    /// Never writes to the relational product.
    #[instrument(skip(self, product), fields(subsystem = "search", component = "enricher", op = "generate_embedding", product_id = product.id))]
    pub async fn generate_embedding(&self, product: &Product) -> Result<()> {
        self.index.ensure_collection(self.backend.dimension()).await?;

        let text = canonical_text(product);
        let embedding = self
            .backend
            .embed_texts(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Backend returned no embedding".to_string()))?;

        self.index.upsert(project(product, embedding)).await?;
        debug!("Product vector upserted");
        Ok(())
    }

    /// Ask the chat model for tags and replace the product's tag set.
    ///
    /// Returns `Ok(false)` and leaves the tags untouched when the model
    /// output does not parse. Existing tag rows are reused by exact name.
    #[instrument(skip(self, product), fields(subsystem = "search", component = "enricher", op = "generate_tags", product_id = product.id))]
    pub async fn generate_tags(&self, product: &mut Product) -> Result<bool> {
        let raw = self
            .backend
            .generate_json_with_system(TAG_SYSTEM_PROMPT, &tag_prompt(product))
            .await?;

        let Some(names) = parse_tags(&raw) else {
            warn!(response_len = raw.len(), "Tag generation returned no usable tags");
            return Ok(false);
        };

        let existing = self.tags.find_by_names(&names).await?;
        product.tags = names
            .into_iter()
            .map(|name| {
                existing
                    .iter()
                    .find(|t| t.name == name)
                    .cloned()
                    .unwrap_or_else(|| ProductTag::unsaved(name))
            })
            .collect();

        info!(tags = ?product.tag_names(), "Tags generated");
        Ok(true)
    }

    /// Generate a rich description unless the current one is already AI-generated.
    ///
    /// Returns whether the product was changed.
    #[instrument(skip(self, product), fields(subsystem = "search", component = "enricher", op = "generate_rich_description", product_id = product.id))]
    pub async fn generate_rich_description(&self, product: &mut Product) -> Result<bool> {
        if product.is_rich_description_ai_generated {
            return Ok(false);
        }

        let raw = self
            .backend
            .generate_with_system(RICH_DESCRIPTION_SYSTEM_PROMPT, &rich_description_prompt(product))
            .await?;
        let text = strip_thinking(&raw);

        if text.is_empty() {
            warn!("Model returned an empty rich description");
            return Ok(false);
        }

        product.rich_description = Some(text);
        product.is_rich_description_ai_generated = true;
        info!("Rich description generated");
        Ok(true)
    }

    /// Tag, embed, optionally describe, and optionally persist a new product.
    ///
    /// Only regenerated fields are persisted. An AI description is dropped
    /// if the stored one changed while it was being generated.
    pub async fn process_new_product(
        &self,
        product: &mut Product,
        persist: bool,
        regenerate_description: bool,
    ) -> Result<()> {
        let start = Instant::now();
        let previous_description = product.rich_description.clone();

        let tagged = self.generate_tags(product).await?;
        self.generate_embedding(product).await?;

        let described = regenerate_description
            && !product.is_rich_description_ai_generated
            && self.generate_rich_description(product).await?;

        let mut enrichment = ProductEnrichment::new(product.id);
        if tagged {
            enrichment = enrichment.with_tags(product.tag_names());
        }
        if let (true, Some(text)) = (described, &product.rich_description) {
            enrichment = enrichment.with_rich_description(text.clone(), previous_description);
        }
        if persist && !enrichment.is_empty() {
            self.products.save_enrichment(&enrichment).await?;
        }

        info!(
            subsystem = "search",
            component = "enricher",
            op = "process_new_product",
            product_id = product.id,
            persist,
            duration_ms = start.elapsed().as_millis() as u64,
            "Product enrichment complete"
        );
        Ok(())
    }

    /// Answer a customer question with the outdoor-gear assistant.
    #[instrument(skip(self, question), fields(subsystem = "search", component = "enricher", op = "support", prompt_len = question.len()))]
    pub async fn support(&self, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }
        let raw = self
            .backend
            .generate_with_system(SUPPORT_SYSTEM_PROMPT, question)
            .await?;
        Ok(strip_thinking(&raw))
    }
}
