//! In-memory repository implementations.
//!
//! Compiled for unit tests and behind the `test-util` feature for the
//! service and handler tests of dependent crates. Behaviour mirrors the persistent implementations
//! closely enough for the services built on top of them: ids are assigned
//! sequentially, tag rows are shared by exact name, and the basket index is
//! maintained on save and delete.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use trailmart_core::{
    BasketRepository, CategoryRepository, Decimal, Error, IdentityRepository, LoginOutcome, LoginRecord,
    ProcessedEvent, Product, ProductCategory, ProductDraft, ProductEnrichment, ProductRepository,
    ProductTag, ProductVector, Registration, RegistrationOutcome, Result, ShoppingCart,
    TagRepository, UserAccount, Vector, VectorIndex, VectorMatch,
};

// =============================================================================
// CATALOG
// =============================================================================

#[derive(Default)]
struct CatalogState {
    categories: BTreeMap<i64, ProductCategory>,
    products: BTreeMap<i64, Product>,
    tags: BTreeMap<String, i64>,
    next_category_id: i64,
    next_product_id: i64,
    next_tag_id: i64,
}

/// In-memory catalog implementing the category, product and tag repositories.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CatalogState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("catalog lock poisoned".to_string()))
    }

    pub fn product_count(&self) -> usize {
        self.lock().map(|s| s.products.len()).unwrap_or(0)
    }

    pub fn tag_count(&self) -> usize {
        self.lock().map(|s| s.tags.len()).unwrap_or(0)
    }
}

fn build_product(
    id: i64,
    draft: ProductDraft,
    category_name: Option<String>,
    existing: Option<&Product>,
) -> Product {
    Product {
        id,
        name: draft.name,
        description: draft.description,
        brand: draft.brand,
        rich_description: draft.rich_description,
        is_rich_description_ai_generated: draft.is_rich_description_ai_generated,
        base_price: draft.base_price,
        is_active: draft.is_active,
        created_at: existing.map(|p| p.created_at).unwrap_or_else(Utc::now),
        category_id: draft.category_id,
        category_name,
        images: draft.images,
        variants: draft.variants,
        tags: existing.map(|p| p.tags.clone()).unwrap_or_default(),
    }
}

#[async_trait]
impl CategoryRepository for MemoryCatalog {
    async fn create(&self, name: &str) -> Result<ProductCategory> {
        let mut state = self.lock()?;
        state.next_category_id += 1;
        let category = ProductCategory {
            id: state.next_category_id,
            name: name.to_string(),
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        Ok(self.lock()?.categories.contains_key(&id))
    }

    async fn list(&self) -> Result<Vec<ProductCategory>> {
        Ok(self.lock()?.categories.values().cloned().collect())
    }
}

#[async_trait]
impl ProductRepository for MemoryCatalog {
    async fn insert(&self, draft: ProductDraft) -> Result<Product> {
        let mut state = self.lock()?;
        let category_name = state
            .categories
            .get(&draft.category_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Error::Validation(format!("Category {} does not exist", draft.category_id))
            })?;
        state.next_product_id += 1;
        let id = state.next_product_id;
        let product = build_product(id, draft, Some(category_name), None);
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn replace(&self, id: i64, draft: ProductDraft) -> Result<Option<Product>> {
        let mut state = self.lock()?;
        let Some(existing) = state.products.get(&id).cloned() else {
            return Ok(None);
        };
        let category_name = state
            .categories
            .get(&draft.category_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Error::Validation(format!("Category {} does not exist", draft.category_id))
            })?;
        let product = build_product(id, draft, Some(category_name), Some(&existing));
        state.products.insert(id, product.clone());
        Ok(Some(product))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.lock()?.products.remove(&id).is_some())
    }

    async fn fetch(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.lock()?.products.get(&id).cloned())
    }

    async fn fetch_many(&self, ids: &[i64]) -> Result<Vec<Product>> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Product>> {
        Ok(self.lock()?.products.values().cloned().collect())
    }

    async fn search_by_name(&self, query: &str) -> Result<Vec<Product>> {
        Ok(self
            .lock()?
            .products
            .values()
            .filter(|p| p.name.contains(query))
            .cloned()
            .collect())
    }

    async fn save_enrichment(&self, enrichment: &ProductEnrichment) -> Result<()> {
        let mut state = self.lock()?;
        if !state.products.contains_key(&enrichment.product_id) {
            return Err(Error::ProductNotFound(enrichment.product_id));
        }

        let tags = match &enrichment.tags {
            Some(names) => {
                let mut tags: Vec<ProductTag> = Vec::new();
                for name in names {
                    if tags.iter().any(|t| &t.name == name) {
                        continue;
                    }
                    let existing = state.tags.get(name).copied();
                    let id = match existing {
                        Some(id) => id,
                        None => {
                            state.next_tag_id += 1;
                            let id = state.next_tag_id;
                            state.tags.insert(name.clone(), id);
                            id
                        }
                    };
                    tags.push(ProductTag {
                        id: Some(id),
                        name: name.clone(),
                    });
                }
                tags.sort_by(|a, b| a.name.cmp(&b.name));
                Some(tags)
            }
            None => None,
        };

        if let Some(product) = state.products.get_mut(&enrichment.product_id) {
            if let Some(tags) = tags {
                product.tags = tags;
            }
            if let Some(update) = &enrichment.rich_description {
                if product.rich_description == update.previous {
                    product.rich_description = Some(update.text.clone());
                    product.is_rich_description_ai_generated = true;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TagRepository for MemoryCatalog {
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<ProductTag>> {
        let state = self.lock()?;
        Ok(state
            .tags
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, id)| ProductTag {
                id: Some(*id),
                name: name.clone(),
            })
            .collect())
    }
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// In-memory vector index using brute-force cosine similarity.
#[derive(Default)]
pub struct MemoryVectorIndex {
    dimension: Mutex<Option<usize>>,
    entries: Mutex<BTreeMap<i64, ProductVector>>,
    ensure_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of times `ensure_collection` was called.
    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, product_id: i64) -> Option<ProductVector> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(&product_id).cloned())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Search("vector index unavailable".to_string()));
        }
        Ok(())
    }

    fn collection_dimension(&self) -> Result<Option<usize>> {
        self.dimension
            .lock()
            .map(|d| *d)
            .map_err(|_| Error::Internal("vector index lock poisoned".to_string()))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn collection_exists(&self) -> Result<bool> {
        self.check_available()?;
        Ok(self.collection_dimension()?.is_some())
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut current = self
            .dimension
            .lock()
            .map_err(|_| Error::Internal("vector index lock poisoned".to_string()))?;
        if current.is_none() {
            *current = Some(dimension);
        }
        Ok(())
    }

    async fn upsert(&self, vector: ProductVector) -> Result<()> {
        self.check_available()?;
        let Some(dimension) = self.collection_dimension()? else {
            return Err(Error::Search("collection does not exist".to_string()));
        };
        if vector.embedding.as_slice().len() != dimension {
            return Err(Error::Search(format!(
                "expected dimension {}, got {}",
                dimension,
                vector.embedding.as_slice().len()
            )));
        }
        self.entries
            .lock()
            .map_err(|_| Error::Internal("vector index lock poisoned".to_string()))?
            .insert(vector.product_id, vector);
        Ok(())
    }

    async fn search(&self, query: &Vector, top_n: usize) -> Result<Vec<VectorMatch>> {
        self.check_available()?;
        if self.collection_dimension()?.is_none() {
            return Err(Error::Search("collection does not exist".to_string()));
        }
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::Internal("vector index lock poisoned".to_string()))?;
        let mut matches: Vec<VectorMatch> = entries
            .values()
            .map(|v| VectorMatch {
                product_id: v.product_id,
                score: cosine(query.as_slice(), v.embedding.as_slice()),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_n);
        Ok(matches)
    }

    async fn delete(&self, product_id: i64) -> Result<()> {
        self.check_available()?;
        self.entries
            .lock()
            .map_err(|_| Error::Internal("vector index lock poisoned".to_string()))?
            .remove(&product_id);
        Ok(())
    }
}

// =============================================================================
// BASKET
// =============================================================================

#[derive(Default)]
struct BasketState {
    carts: HashMap<String, ShoppingCart>,
    index: HashMap<i64, BTreeSet<String>>,
}

/// In-memory basket cache with the product → cart index.
#[derive(Default)]
pub struct MemoryBasketRepository {
    state: Mutex<BasketState>,
}

impl MemoryBasketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BasketState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("basket lock poisoned".to_string()))
    }

    /// Overwrite a cart without touching the index, leaving any existing
    /// index entries stale.
    pub fn store_unindexed(&self, cart: ShoppingCart) {
        if let Ok(mut state) = self.lock() {
            state.carts.insert(cart.user_id.clone(), cart);
        }
    }

    /// Raw index entries for a product, including stale ones.
    pub fn indexed_users(&self, product_id: i64) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|s| s.index.get(&product_id).cloned())
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BasketRepository for MemoryBasketRepository {
    async fn get(&self, user_id: &str) -> Result<Option<ShoppingCart>> {
        Ok(self.lock()?.carts.get(user_id).cloned())
    }

    async fn save(&self, cart: &ShoppingCart) -> Result<()> {
        let mut state = self.lock()?;
        let current = cart.product_ids();
        if let Some(previous) = state.carts.get(&cart.user_id).map(ShoppingCart::product_ids) {
            for product_id in previous {
                if !current.contains(&product_id) {
                    if let Some(users) = state.index.get_mut(&product_id) {
                        users.remove(&cart.user_id);
                    }
                }
            }
        }
        for product_id in current {
            state
                .index
                .entry(product_id)
                .or_default()
                .insert(cart.user_id.clone());
        }
        state.carts.insert(cart.user_id.clone(), cart.clone());
        Ok(())
    }

    async fn patch_price(&self, user_id: &str, product_id: i64, price: Decimal) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(cart) = state
            .carts
            .get_mut(user_id)
            .filter(|c| c.contains_product(product_id))
        else {
            return Ok(false);
        };
        for item in cart.items.iter_mut().filter(|i| i.product_id == product_id) {
            item.price = price;
        }
        Ok(true)
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(removed) = state.carts.remove(user_id) else {
            return Ok(false);
        };
        for product_id in removed.product_ids() {
            if let Some(users) = state.index.get_mut(&product_id) {
                users.remove(user_id);
            }
        }
        Ok(true)
    }

    async fn user_ids_for_product(&self, product_id: i64) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .index
            .get(&product_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn unlink_product(&self, product_id: i64, user_id: &str) -> Result<()> {
        if let Some(users) = self.lock()?.index.get_mut(&product_id) {
            users.remove(user_id);
        }
        Ok(())
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

#[derive(Default)]
struct IdentityState {
    users: HashMap<String, UserAccount>,
    ledger: HashMap<String, ProcessedEvent>,
}

/// In-memory user projection and processed-event ledger.
#[derive(Default)]
pub struct MemoryIdentityRepository {
    state: Mutex<IdentityState>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IdentityState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("identity lock poisoned".to_string()))
    }

    pub fn user_count(&self) -> usize {
        self.lock().map(|s| s.users.len()).unwrap_or(0)
    }

    pub fn processed_count(&self) -> usize {
        self.lock().map(|s| s.ledger.len()).unwrap_or(0)
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn apply_registration(
        &self,
        registration: &Registration,
    ) -> Result<RegistrationOutcome> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if state.ledger.contains_key(&registration.uid) {
            return Ok(RegistrationOutcome::Duplicate);
        }

        let outcome = match state.users.get_mut(&registration.user_id) {
            Some(user) => {
                user.username = registration.username.clone();
                if registration.realm_id.is_some() {
                    user.realm_id = registration.realm_id.clone();
                }
                user.updated_at = Some(registration.occurred_at);
                RegistrationOutcome::Updated
            }
            None => {
                state.users.insert(
                    registration.user_id.clone(),
                    UserAccount {
                        keycloak_id: registration.user_id.clone(),
                        username: registration.username.clone(),
                        realm_id: registration.realm_id.clone(),
                        created_client_id: registration.client_id.clone(),
                        created_from_ip: registration.ip_address.clone(),
                        last_login_ip: None,
                        last_session_id: None,
                        created_at: registration.occurred_at,
                        last_login_at: None,
                        updated_at: None,
                    },
                );
                RegistrationOutcome::Created
            }
        };

        state.ledger.insert(
            registration.uid.clone(),
            ProcessedEvent {
                uid: registration.uid.clone(),
                event_type: registration.event_type.clone(),
                processed_at: Utc::now(),
            },
        );
        Ok(outcome)
    }

    async fn record_login(&self, login: &LoginRecord) -> Result<LoginOutcome> {
        let mut state = self.lock()?;
        match state.users.get_mut(&login.user_id) {
            Some(user) => {
                user.last_login_at = Some(login.occurred_at);
                user.last_login_ip = login.ip_address.clone();
                user.last_session_id = login.session_id.clone();
                user.updated_at = Some(login.occurred_at);
                Ok(LoginOutcome::Updated)
            }
            None => Ok(LoginOutcome::UnknownUser),
        }
    }

    async fn get_user(&self, keycloak_id: &str) -> Result<Option<UserAccount>> {
        Ok(self.lock()?.users.get(keycloak_id).cloned())
    }

    async fn is_processed(&self, uid: &str) -> Result<bool> {
        Ok(self.lock()?.ledger.contains_key(uid))
    }
}
