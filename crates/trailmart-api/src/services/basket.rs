//! Basket cache over catalog truth.
//!
//! Explicit updates re-resolve every line against the catalog and never
//! trust client prices. Price-change events patch carts that were cached
//! before the change, found through the product → cart index.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use trailmart_core::{BasketRepository, Decimal, Error, ProductLookup, Result, ShoppingCart};

pub struct BasketService {
    repository: Arc<dyn BasketRepository>,
    lookup: Arc<dyn ProductLookup>,
}

impl BasketService {
    pub fn new(repository: Arc<dyn BasketRepository>, lookup: Arc<dyn ProductLookup>) -> Self {
        Self { repository, lookup }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<ShoppingCart>> {
        self.repository.get(user_id).await
    }

    /// Resolve current name and price for every line, then store the cart.
    ///
    /// Fails with [`Error::ProductNotFound`] for the first line whose product
    /// no longer exists; nothing is stored in that case.
    #[instrument(skip(self, cart), fields(subsystem = "basket", op = "update", user_id = %cart.user_id))]
    pub async fn update(&self, mut cart: ShoppingCart) -> Result<ShoppingCart> {
        if cart.user_id.trim().is_empty() {
            return Err(Error::Validation("userId must not be empty".to_string()));
        }
        if let Some(item) = cart.items.iter().find(|i| i.quantity <= 0) {
            return Err(Error::Validation(format!(
                "quantity of product {} must be positive",
                item.product_id
            )));
        }

        for item in cart.items.iter_mut() {
            let product = self
                .lookup
                .get_product(item.product_id)
                .await?
                .ok_or(Error::ProductNotFound(item.product_id))?;
            item.price = product.display_price;
            item.product_name = product.name;
        }

        self.repository.save(&cart).await?;
        info!(items = cart.items.len(), total = %cart.total_price(), "Basket updated");
        Ok(cart)
    }

    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        self.repository.delete(user_id).await
    }

    /// Rewrite the cached price of `product_id` in every cart that holds it.
    ///
    /// Each cart is patched in place by the repository, so a concurrent
    /// basket update is never overwritten with an older copy. Index entries
    /// pointing at carts that no longer hold the product are pruned.
    /// Returns the number of carts patched.
    #[instrument(skip(self), fields(subsystem = "basket", op = "apply_price_change"))]
    pub async fn apply_price_change(&self, product_id: i64, new_price: Decimal) -> Result<usize> {
        let mut patched = 0;

        for user_id in self.repository.user_ids_for_product(product_id).await? {
            if self
                .repository
                .patch_price(&user_id, product_id, new_price)
                .await?
            {
                patched += 1;
            } else {
                debug!(%user_id, "Indexed cart no longer holds product, pruning index entry");
                self.repository.unlink_product(product_id, &user_id).await?;
            }
        }

        info!(carts_patched = patched, new_price = %new_price, "Price change applied to baskets");
        Ok(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use trailmart_core::{ProductSnapshot, ShoppingCartItem};
    use trailmart_db::MemoryBasketRepository;

    /// Serves reads from a snapshot taken before the last write.
    struct LaggingReads {
        inner: MemoryBasketRepository,
        snapshot: ShoppingCart,
    }

    #[async_trait]
    impl BasketRepository for LaggingReads {
        async fn get(&self, _user_id: &str) -> Result<Option<ShoppingCart>> {
            Ok(Some(self.snapshot.clone()))
        }
        async fn save(&self, cart: &ShoppingCart) -> Result<()> {
            self.inner.save(cart).await
        }
        async fn patch_price(&self, user_id: &str, product_id: i64, price: Decimal) -> Result<bool> {
            self.inner.patch_price(user_id, product_id, price).await
        }
        async fn delete(&self, user_id: &str) -> Result<bool> {
            self.inner.delete(user_id).await
        }
        async fn user_ids_for_product(&self, product_id: i64) -> Result<Vec<String>> {
            self.inner.user_ids_for_product(product_id).await
        }
        async fn unlink_product(&self, product_id: i64, user_id: &str) -> Result<()> {
            self.inner.unlink_product(product_id, user_id).await
        }
    }

    struct NoLookup;

    #[async_trait]
    impl ProductLookup for NoLookup {
        async fn get_product(&self, _product_id: i64) -> Result<Option<ProductSnapshot>> {
            Ok(None)
        }
    }

    fn cart(quantity: i32, price: i64) -> ShoppingCart {
        ShoppingCart {
            user_id: "u1".into(),
            items: vec![ShoppingCartItem {
                product_id: 7,
                product_name: "Tent".into(),
                price: Decimal::from(price),
                quantity,
            }],
        }
    }

    #[tokio::test]
    async fn test_price_patch_keeps_concurrent_quantity_change() {
        let inner = MemoryBasketRepository::new();
        inner.save(&cart(5, 100)).await.unwrap();
        let repository = Arc::new(LaggingReads {
            inner,
            snapshot: cart(1, 100),
        });
        let service = BasketService::new(repository.clone(), Arc::new(NoLookup));

        let patched = service
            .apply_price_change(7, Decimal::from(80))
            .await
            .unwrap();

        assert_eq!(patched, 1);
        let stored = repository.inner.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.items[0].quantity, 5);
        assert_eq!(stored.items[0].price, Decimal::from(80));
    }

    #[tokio::test]
    async fn test_price_change_prunes_stale_index_entry() {
        let inner = Arc::new(MemoryBasketRepository::new());
        inner.save(&cart(2, 100)).await.unwrap();
        inner.store_unindexed(ShoppingCart::new("u1"));
        let service = BasketService::new(inner.clone(), Arc::new(NoLookup));

        assert_eq!(service.apply_price_change(7, Decimal::from(80)).await.unwrap(), 0);
        assert!(inner.indexed_users(7).is_empty());
    }
}
