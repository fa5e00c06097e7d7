//! Catalog of record: validated product writes and the events they publish.
//!
//! Every write validates first and persists in one repository call, so a
//! rejected request never leaves partial state. Events are published after
//! the write commits. A publish failure is logged and the committed write
//! is still returned: a lost event is possible, a phantom event is not.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument};

use trailmart_core::{
    AiStatus, CategoryRepository, Decimal, Error, EventPublisher, IntegrationEvent,
    IntegrationEventKind, Product, ProductDraft, ProductImage, ProductRepository,
    ProductSnapshot, ProductUpsertRequest, ProductVariant, Result,
};

/// Display price: the cheapest variant, zero when there are none.
pub fn display_price(variants: &[ProductVariant]) -> Decimal {
    variants
        .iter()
        .map(|v| v.price)
        .min()
        .unwrap_or(Decimal::ZERO)
}

/// At least one variant; every SKU non-blank and every price positive.
pub fn validate_variants(variants: &[ProductVariant]) -> Result<()> {
    if variants.is_empty() {
        return Err(Error::Validation(
            "product must have at least one variant".to_string(),
        ));
    }
    for variant in variants {
        if variant.sku.trim().is_empty() {
            return Err(Error::Validation("variant SKU must not be blank".to_string()));
        }
        if variant.price <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "price of SKU {} must be greater than 0",
                variant.sku
            )));
        }
    }
    Ok(())
}

/// At most one primary image.
pub fn validate_images(images: &[ProductImage]) -> Result<()> {
    if images.iter().filter(|img| img.is_primary).count() > 1 {
        return Err(Error::Validation(
            "a product may have at most one primary image".to_string(),
        ));
    }
    Ok(())
}

/// Rich-description state to persist for a write.
///
/// `existing` is the stored `(rich_description, ai_generated)` pair on
/// update and `None` on create.
pub fn resolve_rich_description(
    request: &ProductUpsertRequest,
    existing: Option<(Option<String>, bool)>,
) -> (Option<String>, bool) {
    if request.use_ai_generated_rich_description {
        return (None, false);
    }
    let incoming = request
        .rich_description
        .as_deref()
        .filter(|d| !d.trim().is_empty());
    if let Some(text) = incoming {
        return (Some(text.to_string()), false);
    }
    match existing {
        Some((Some(current), ai)) if !current.trim().is_empty() => (Some(current), ai),
        _ => (Some(request.description.clone()), false),
    }
}

/// Product as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub rich_description: Option<String>,
    #[serde(rename = "isRichDescriptionAIGenerated")]
    pub is_rich_description_ai_generated: bool,
    pub base_price: Decimal,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub category_id: i64,
    pub category_name: Option<String>,
    pub primary_image_url: Option<String>,
    pub images: Vec<ProductImage>,
    pub variants: Vec<ProductVariant>,
    pub tags: Vec<String>,
    pub ai_status: Vec<AiStatus>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        let ai_status = product.ai_status();
        let primary_image_url = product.primary_image_url().map(str::to_string);
        let tags = product.tag_names();
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            brand: product.brand,
            rich_description: product.rich_description,
            is_rich_description_ai_generated: product.is_rich_description_ai_generated,
            base_price: product.base_price,
            is_active: product.is_active,
            created_at: product.created_at,
            category_id: product.category_id,
            category_name: product.category_name,
            primary_image_url,
            images: product.images,
            variants: product.variants,
            tags,
            ai_status,
        }
    }
}

/// Catalog write and read operations.
pub struct CatalogService {
    categories: Arc<dyn CategoryRepository>,
    products: Arc<dyn ProductRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl CatalogService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        products: Arc<dyn ProductRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            categories,
            products,
            publisher,
        }
    }

    pub async fn list(&self) -> Result<Vec<Product>> {
        self.products.list().await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Product>> {
        self.products.fetch(id).await
    }

    /// Substring match over product names.
    pub async fn search(&self, query: &str) -> Result<Vec<Product>> {
        self.products.search_by_name(query).await
    }

    /// Synchronous lookup projection used by the basket.
    pub async fn lookup(&self, id: i64) -> Result<Option<ProductSnapshot>> {
        Ok(self.products.fetch(id).await?.as_ref().map(ProductSnapshot::from))
    }

    /// Validate, persist, and publish `ProductCreated`.
    #[instrument(skip(self, request), fields(subsystem = "catalog", op = "create"))]
    pub async fn create(&self, request: ProductUpsertRequest) -> Result<Product> {
        self.ensure_category_exists(request.category_id).await?;
        validate_variants(&request.variants)?;
        validate_images(&request.images)?;

        let wants_ai_description = request.use_ai_generated_rich_description;
        let (rich_description, ai_generated) = resolve_rich_description(&request, None);

        let product = self
            .products
            .insert(ProductDraft {
                base_price: display_price(&request.variants),
                rich_description,
                is_rich_description_ai_generated: ai_generated,
                name: request.name,
                description: request.description,
                brand: request.brand,
                is_active: request.is_active,
                category_id: request.category_id,
                images: request.images,
                variants: request.variants,
            })
            .await?;

        info!(product_id = product.id, base_price = %product.base_price, "Product created");

        self.publish(IntegrationEvent::new(IntegrationEventKind::ProductCreated {
            product_id: product.id,
            name: product.name.clone(),
            brand: product.brand.clone(),
            description: product.description.clone(),
            base_price: product.base_price,
            use_ai_generated_rich_description: wants_ai_description,
        }))
        .await;

        Ok(product)
    }

    /// Replace a product wholesale and publish `ProductUpdated`, plus
    /// `ProductPriceChanged` when the display price moved.
    ///
    /// Returns `None` when the product does not exist.
    #[instrument(skip(self, request), fields(subsystem = "catalog", op = "update", product_id = id))]
    pub async fn update(&self, id: i64, request: ProductUpsertRequest) -> Result<Option<Product>> {
        let Some(existing) = self.products.fetch(id).await? else {
            return Ok(None);
        };

        validate_variants(&request.variants)?;
        validate_images(&request.images)?;
        if existing.category_id != request.category_id {
            self.ensure_category_exists(request.category_id).await?;
        }

        let wants_ai_description = request.use_ai_generated_rich_description;
        let (rich_description, ai_generated) = resolve_rich_description(
            &request,
            Some((
                existing.rich_description.clone(),
                existing.is_rich_description_ai_generated,
            )),
        );
        let new_price = display_price(&request.variants);

        let Some(updated) = self
            .products
            .replace(
                id,
                ProductDraft {
                    base_price: new_price,
                    rich_description,
                    is_rich_description_ai_generated: ai_generated,
                    name: request.name,
                    description: request.description,
                    brand: request.brand,
                    is_active: request.is_active,
                    category_id: request.category_id,
                    images: request.images,
                    variants: request.variants,
                },
            )
            .await?
        else {
            return Ok(None);
        };

        let price_changed = existing.base_price != updated.base_price;
        info!(
            old_price = %existing.base_price,
            new_price = %updated.base_price,
            price_changed,
            "Product updated"
        );

        self.publish(IntegrationEvent::new(IntegrationEventKind::ProductUpdated {
            product_id: updated.id,
            name: updated.name.clone(),
            brand: updated.brand.clone(),
            description: updated.description.clone(),
            base_price: updated.base_price,
            use_ai_generated_rich_description: wants_ai_description,
        }))
        .await;

        if price_changed {
            self.publish(IntegrationEvent::new(
                IntegrationEventKind::ProductPriceChanged {
                    product_id: updated.id,
                    name: updated.name.clone(),
                    description: updated.description.clone(),
                    price: updated.base_price,
                    image_url: updated.primary_image_url().unwrap_or_default().to_string(),
                },
            ))
            .await;
        }

        Ok(Some(updated))
    }

    /// Hard-delete a product and publish `ProductDeleted`.
    ///
    /// Cached baskets are not touched.
    #[instrument(skip(self), fields(subsystem = "catalog", op = "delete", product_id = id))]
    pub async fn delete(&self, id: i64) -> Result<bool> {
        if !self.products.delete(id).await? {
            return Ok(false);
        }
        info!("Product deleted");
        self.publish(IntegrationEvent::new(IntegrationEventKind::ProductDeleted {
            product_id: id,
        }))
        .await;
        Ok(true)
    }

    async fn ensure_category_exists(&self, category_id: i64) -> Result<()> {
        if !self.categories.exists(category_id).await? {
            return Err(Error::Validation(format!(
                "categoryId '{category_id}' does not exist"
            )));
        }
        Ok(())
    }

    async fn publish(&self, event: IntegrationEvent) {
        let event_id = event.event_id;
        let event_type = event.event_type();
        if let Err(e) = self.publisher.publish(event).await {
            error!(%event_id, event_type, error = %e, "Failed to publish integration event after commit");
        }
    }
}
