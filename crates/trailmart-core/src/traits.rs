//! Core traits for trailmart abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! (PostgreSQL, Redis, in-memory, Ollama, HTTP) must satisfy, enabling
//! pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CATALOG REPOSITORY TRAITS
// =============================================================================

/// Repository for product categories.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a category.
    async fn create(&self, name: &str) -> Result<ProductCategory>;

    /// Check whether a category exists.
    async fn exists(&self, id: i64) -> Result<bool>;

    /// List all categories ordered by id.
    async fn list(&self) -> Result<Vec<ProductCategory>>;
}

/// Repository for products and their owned collections.
///
/// Images and variants are owned by the product: `replace` swaps both
/// collections wholesale rather than merging.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a product with its images and variants in one transaction.
    async fn insert(&self, draft: ProductDraft) -> Result<Product>;

    /// Replace a product's fields, images, and variants in one transaction.
    ///
    /// Returns `None` when the product does not exist. Tags are kept.
    async fn replace(&self, id: i64, draft: ProductDraft) -> Result<Option<Product>>;

    /// Hard-delete a product. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Fetch a product with images, variants, tags, and category name.
    async fn fetch(&self, id: i64) -> Result<Option<Product>>;

    /// Fetch several products. Missing ids are skipped; order is unspecified.
    async fn fetch_many(&self, ids: &[i64]) -> Result<Vec<Product>>;

    /// List all products ordered by id.
    async fn list(&self) -> Result<Vec<Product>>;

    /// Case-sensitive substring match over product names.
    async fn search_by_name(&self, query: &str) -> Result<Vec<Product>>;

    /// Persist AI-derived state: tag set (reusing tag rows by exact name)
    /// and rich description, in one transaction.
    async fn save_enrichment(&self, enrichment: &ProductEnrichment) -> Result<()>;
}

/// Repository for tag rows shared across products.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Existing tags whose names exactly match (case-sensitive) one of `names`.
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<ProductTag>>;
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// Similarity index over product projections, keyed by product id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether the collection has been created.
    async fn collection_exists(&self) -> Result<bool>;

    /// Create the collection if missing.
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    /// Insert or overwrite the projection for `vector.product_id`.
    async fn upsert(&self, vector: ProductVector) -> Result<()>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn search(&self, query: &Vector, top_n: usize) -> Result<Vec<VectorMatch>>;

    /// Remove a product's projection. Missing entries are not an error.
    async fn delete(&self, product_id: i64) -> Result<()>;
}

// =============================================================================
// BASKET
// =============================================================================

/// Cache of per-user carts with a product → carts secondary index.
#[async_trait]
pub trait BasketRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<ShoppingCart>>;

    /// Store a cart and refresh the product index for its lines.
    async fn save(&self, cart: &ShoppingCart) -> Result<()>;

    /// Set the price of every line for `product_id` in the stored cart,
    /// atomically with respect to concurrent saves. Nothing else changes.
    ///
    /// Returns `false` when the cart is gone or no longer holds the product.
    async fn patch_price(&self, user_id: &str, product_id: i64, price: Decimal) -> Result<bool>;

    /// Remove a cart. Returns whether one existed.
    async fn delete(&self, user_id: &str) -> Result<bool>;

    /// Users whose cached cart is indexed under `product_id`.
    async fn user_ids_for_product(&self, product_id: i64) -> Result<Vec<String>>;

    /// Drop a stale index entry.
    async fn unlink_product(&self, product_id: i64, user_id: &str) -> Result<()>;
}

/// Low-latency synchronous product lookup against the catalog of record.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// Current product state, or `None` when the product does not exist.
    async fn get_product(&self, product_id: i64) -> Result<Option<ProductSnapshot>>;
}

// =============================================================================
// IDENTITY
// =============================================================================

/// A `register` event ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Upstream event uid recorded in the idempotency ledger.
    pub uid: String,
    pub event_type: String,
    pub user_id: String,
    pub username: String,
    pub realm_id: Option<String>,
    pub client_id: Option<String>,
    pub ip_address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A `login` event ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub user_id: String,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    Updated,
    /// The uid was already in the ledger; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Updated,
    UnknownUser,
}

/// User projection store guarded by the idempotency ledger.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Upsert the user and record `registration.uid` in the ledger, atomically.
    ///
    /// If the uid is already recorded nothing is written and
    /// [`RegistrationOutcome::Duplicate`] is returned.
    async fn apply_registration(&self, registration: &Registration)
        -> Result<RegistrationOutcome>;

    /// Update last-login fields of an existing user.
    async fn record_login(&self, login: &LoginRecord) -> Result<LoginOutcome>;

    async fn get_user(&self, keycloak_id: &str) -> Result<Option<UserAccount>>;

    /// Whether `uid` is present in the ledger.
    async fn is_processed(&self, uid: &str) -> Result<bool>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for chat-style text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with system context, constraining the output to JSON.
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}
