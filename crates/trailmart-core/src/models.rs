//! Core data models for trailmart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use pgvector::Vector;
pub use rust_decimal::Decimal;

// =============================================================================
// CATALOG
// =============================================================================

/// Product image reference. At most one image per product is primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub url: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// A purchasable variant. The product's display price is the cheapest variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub sku: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
}

/// Tag attached to a product. `id` is `None` until the tag row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTag {
    pub id: Option<i64>,
    pub name: String,
}

impl ProductTag {
    /// A tag that has not been persisted yet.
    pub fn unsaved(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// Product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
}

/// A catalog product with its images, variants, and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub rich_description: Option<String>,
    #[serde(rename = "isRichDescriptionAIGenerated")]
    pub is_rich_description_ai_generated: bool,
    pub base_price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub category_id: i64,
    pub category_name: Option<String>,
    pub images: Vec<ProductImage>,
    pub variants: Vec<ProductVariant>,
    pub tags: Vec<ProductTag>,
}

impl Product {
    /// URL of the primary image, falling back to the first image.
    pub fn primary_image_url(&self) -> Option<&str> {
        self.images
            .iter()
            .find(|img| img.is_primary)
            .or_else(|| self.images.first())
            .map(|img| img.url.as_str())
    }

    /// True when a non-blank rich description is present.
    pub fn has_rich_description(&self) -> bool {
        self.rich_description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Read-time AI readiness projection; never persisted.
    pub fn ai_status(&self) -> Vec<AiStatus> {
        AiStatus::project(!self.tags.is_empty(), self.has_rich_description())
    }
}

/// Derived AI-readiness state surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiStatus {
    GeneratingTags,
    GeneratingRichDescription,
    Completed,
}

impl AiStatus {
    /// Project readiness from the two facts the pipeline produces.
    pub fn project(has_tags: bool, has_rich_description: bool) -> Vec<AiStatus> {
        let mut statuses = Vec::with_capacity(2);
        if !has_tags {
            statuses.push(AiStatus::GeneratingTags);
        }
        if !has_rich_description {
            statuses.push(AiStatus::GeneratingRichDescription);
        }
        if has_tags && has_rich_description {
            statuses.push(AiStatus::Completed);
        }
        statuses
    }
}

/// Caller-supplied fields for creating or updating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpsertRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub rich_description: Option<String>,
    #[serde(default, rename = "useAIGeneratedRichDescription")]
    pub use_ai_generated_rich_description: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub category_id: i64,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

fn default_active() -> bool {
    true
}

/// Validated product state handed to the repository for insert or wholesale replace.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub brand: String,
    pub rich_description: Option<String>,
    pub is_rich_description_ai_generated: bool,
    pub base_price: Decimal,
    pub is_active: bool,
    pub category_id: i64,
    pub images: Vec<ProductImage>,
    pub variants: Vec<ProductVariant>,
}

/// AI-derived product state written back after enrichment.
///
/// Only regenerated fields are set, so a concurrent catalog write to any
/// other column survives.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductEnrichment {
    pub product_id: i64,
    /// Replacement tag set. `None` leaves the tags untouched.
    pub tags: Option<Vec<String>>,
    /// Regenerated rich description. `None` leaves the column untouched.
    pub rich_description: Option<RichDescriptionUpdate>,
}

/// AI rich description guarded by the value it was generated from.
///
/// The write is skipped when the stored description no longer equals
/// `previous`: a newer hand-written description wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RichDescriptionUpdate {
    pub text: String,
    pub previous: Option<String>,
}

impl ProductEnrichment {
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            tags: None,
            rich_description: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_rich_description(mut self, text: impl Into<String>, previous: Option<String>) -> Self {
        self.rich_description = Some(RichDescriptionUpdate {
            text: text.into(),
            previous,
        });
        self
    }

    /// True when nothing would be written.
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.rich_description.is_none()
    }
}

/// Synchronous lookup response used by the basket to resolve price and name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub display_price: Decimal,
    pub primary_image_url: Option<String>,
    pub variants: Vec<ProductVariant>,
}

impl From<&Product> for ProductSnapshot {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            brand: product.brand.clone(),
            display_price: product.base_price,
            primary_image_url: product.primary_image_url().map(str::to_string),
            variants: product.variants.clone(),
        }
    }
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// Read-optimized projection of a product stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductVector {
    pub product_id: i64,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub price: Decimal,
    pub primary_image_url: Option<String>,
    pub embedding: Vector,
}

/// A nearest-neighbour hit. `score` is cosine similarity (1.0 = identical).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMatch {
    pub product_id: i64,
    pub score: f32,
}

// =============================================================================
// BASKET
// =============================================================================

/// One line of a cached cart. Name and price are catalog snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingCartItem {
    pub product_id: i64,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub price: Decimal,
    pub quantity: i32,
}

impl ShoppingCartItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A user's cart as held by the basket cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", into = "ShoppingCartWire")]
pub struct ShoppingCart {
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<ShoppingCartItem>,
}

impl ShoppingCart {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            items: Vec::new(),
        }
    }

    /// Σ price × quantity over all lines.
    pub fn total_price(&self) -> Decimal {
        self.items.iter().map(ShoppingCartItem::line_total).sum()
    }

    /// Distinct product ids referenced by this cart.
    pub fn product_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.items.iter().map(|i| i.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn contains_product(&self, product_id: i64) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }
}

/// Serialized cart shape; carries the derived total for clients.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShoppingCartWire {
    user_id: String,
    items: Vec<ShoppingCartItem>,
    total_price: Decimal,
}

impl From<ShoppingCart> for ShoppingCartWire {
    fn from(cart: ShoppingCart) -> Self {
        let total_price = cart.total_price();
        Self {
            user_id: cart.user_id,
            items: cart.items,
            total_price,
        }
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Local projection of an identity-provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub keycloak_id: String,
    pub username: String,
    pub realm_id: Option<String>,
    pub created_client_id: Option<String>,
    pub created_from_ip: Option<String>,
    pub last_login_ip: Option<String>,
    pub last_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Idempotency ledger row: the upstream event `uid` has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub uid: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: 1,
            name: "Tent".to_string(),
            description: "Two-person tent".to_string(),
            brand: "Ridge".to_string(),
            rich_description: None,
            is_rich_description_ai_generated: false,
            base_price: Decimal::from(100),
            is_active: true,
            created_at: Utc::now(),
            category_id: 1,
            category_name: None,
            images: vec![],
            variants: vec![],
            tags: vec![],
        }
    }

    #[test]
    fn test_primary_image_url_prefers_primary() {
        let mut p = product();
        p.images = vec![
            ProductImage {
                url: "a.jpg".into(),
                is_primary: false,
            },
            ProductImage {
                url: "b.jpg".into(),
                is_primary: true,
            },
        ];
        assert_eq!(p.primary_image_url(), Some("b.jpg"));
    }

    #[test]
    fn test_primary_image_url_falls_back_to_first() {
        let mut p = product();
        assert_eq!(p.primary_image_url(), None);
        p.images = vec![ProductImage {
            url: "a.jpg".into(),
            is_primary: false,
        }];
        assert_eq!(p.primary_image_url(), Some("a.jpg"));
    }

    #[test]
    fn test_ai_status_projection() {
        assert_eq!(
            AiStatus::project(false, false),
            vec![AiStatus::GeneratingTags, AiStatus::GeneratingRichDescription]
        );
        assert_eq!(
            AiStatus::project(true, false),
            vec![AiStatus::GeneratingRichDescription]
        );
        assert_eq!(AiStatus::project(false, true), vec![AiStatus::GeneratingTags]);
        assert_eq!(AiStatus::project(true, true), vec![AiStatus::Completed]);
    }

    #[test]
    fn test_blank_rich_description_counts_as_missing() {
        let mut p = product();
        p.tags = vec![ProductTag::unsaved("camping")];
        p.rich_description = Some("   ".into());
        assert_eq!(p.ai_status(), vec![AiStatus::GeneratingRichDescription]);
    }

    #[test]
    fn test_ai_status_serializes_as_names() {
        let json = serde_json::to_string(&AiStatus::GeneratingTags).unwrap();
        assert_eq!(json, "\"GeneratingTags\"");
    }

    #[test]
    fn test_cart_total_price() {
        let cart = ShoppingCart {
            user_id: "alice".into(),
            items: vec![
                ShoppingCartItem {
                    product_id: 1,
                    product_name: "Tent".into(),
                    price: Decimal::new(1050, 1),
                    quantity: 2,
                },
                ShoppingCartItem {
                    product_id: 2,
                    product_name: "Lamp".into(),
                    price: Decimal::from(20),
                    quantity: 1,
                },
            ],
        };
        assert_eq!(cart.total_price(), Decimal::from(230));
    }

    #[test]
    fn test_cart_serializes_total_price() {
        let mut cart = ShoppingCart::new("alice");
        cart.items.push(ShoppingCartItem {
            product_id: 7,
            product_name: "Stove".into(),
            price: Decimal::from(15),
            quantity: 3,
        });
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["totalPrice"].as_f64(), Some(45.0));
        assert_eq!(json["items"][0]["productId"], 7);

        let back: ShoppingCart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }

    #[test]
    fn test_cart_product_ids_are_distinct() {
        let mut cart = ShoppingCart::new("bob");
        for id in [3, 1, 3] {
            cart.items.push(ShoppingCartItem {
                product_id: id,
                product_name: String::new(),
                price: Decimal::ZERO,
                quantity: 1,
            });
        }
        assert_eq!(cart.product_ids(), vec![1, 3]);
        assert!(cart.contains_product(3));
        assert!(!cart.contains_product(2));
    }

    #[test]
    fn test_upsert_request_defaults() {
        let req: ProductUpsertRequest = serde_json::from_str(
            r#"{"name":"Tent","categoryId":1,"variants":[{"sku":"T1","price":100}]}"#,
        )
        .unwrap();
        assert!(req.is_active);
        assert!(!req.use_ai_generated_rich_description);
        assert_eq!(req.variants[0].price, Decimal::from(100));
        assert!(req.images.is_empty());
    }

    #[test]
    fn test_snapshot_from_product() {
        let mut p = product();
        p.images.push(ProductImage {
            url: "tent.jpg".into(),
            is_primary: true,
        });
        let snap = ProductSnapshot::from(&p);
        assert_eq!(snap.display_price, Decimal::from(100));
        assert_eq!(snap.primary_image_url.as_deref(), Some("tent.jpg"));
    }
}
