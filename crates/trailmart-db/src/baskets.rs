//! Redis-backed basket cache.
//!
//! Carts are stored as JSON under `basket:{user_id}`. Each product present
//! in a cart is indexed in the set `basket:product:{product_id}` so price
//! changes can find affected carts without scanning the keyspace. Index
//! entries may go stale when a cart expires or is overwritten elsewhere;
//! readers verify the cart and prune with [`BasketRepository::unlink_product`].
//!
//! Every write is a compare-and-swap: a Lua script replaces the cart only if
//! it still holds the JSON the write was computed from, and applies the
//! index changes in the same step. A lost race re-reads and retries.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, info};

use trailmart_core::defaults::{BASKET_KEY_PREFIX, BASKET_PRODUCT_INDEX_PREFIX};
use trailmart_core::{BasketRepository, Decimal, Error, Result, ShoppingCart};

/// Attempts before a contended write gives up.
const SWAP_ATTEMPTS: usize = 8;

/// KEYS[1] cart, KEYS[2..2+n) index sets to add to, the rest to remove from.
/// ARGV: expected JSON ("" when absent), new JSON ("" deletes), n, user id.
const SWAP_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1]) or ''
if current ~= ARGV[1] then
  return 0
end
if ARGV[2] == '' then
  redis.call('DEL', KEYS[1])
else
  redis.call('SET', KEYS[1], ARGV[2])
end
local adds = tonumber(ARGV[3])
for i = 2, 1 + adds do
  redis.call('SADD', KEYS[i], ARGV[4])
end
for i = 2 + adds, #KEYS do
  redis.call('SREM', KEYS[i], ARGV[4])
end
return 1
"#;

/// Basket repository backed by Redis.
#[derive(Clone)]
pub struct RedisBasketRepository {
    conn: ConnectionManager,
    swap_script: Script,
}

impl RedisBasketRepository {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            swap_script: Script::new(SWAP_SCRIPT),
        }
    }

    /// Connect to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(cache_err)?;
        let conn = ConnectionManager::new(client).await.map_err(cache_err)?;
        info!(
            subsystem = "basket",
            component = "redis",
            op = "connect",
            "Basket cache connected"
        );
        Ok(Self::new(conn))
    }

    async fn read_raw(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(cart_key(user_id)).await.map_err(cache_err)
    }

    /// Replace the cart stored for `user_id` if it still equals `expected`.
    async fn swap(
        &self,
        user_id: &str,
        expected: Option<&str>,
        next: Option<&str>,
        indexed: &[i64],
        unindexed: &[i64],
    ) -> Result<bool> {
        let mut invocation = self.swap_script.prepare_invoke();
        invocation.key(cart_key(user_id));
        for product_id in indexed {
            invocation.key(index_key(*product_id));
        }
        for product_id in unindexed {
            invocation.key(index_key(*product_id));
        }
        invocation
            .arg(expected.unwrap_or(""))
            .arg(next.unwrap_or(""))
            .arg(indexed.len())
            .arg(user_id);

        let mut conn = self.conn.clone();
        let swapped: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(swapped == 1)
    }
}

fn cache_err(e: redis::RedisError) -> Error {
    Error::Cache(e.to_string())
}

fn contended(user_id: &str) -> Error {
    Error::Cache(format!(
        "cart of {user_id} changed concurrently {SWAP_ATTEMPTS} times, giving up"
    ))
}

fn parse_cart(raw: &str) -> Result<ShoppingCart> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn cart_key(user_id: &str) -> String {
    format!("{}:{}", BASKET_KEY_PREFIX, user_id)
}

pub(crate) fn index_key(product_id: i64) -> String {
    format!("{}:{}", BASKET_PRODUCT_INDEX_PREFIX, product_id)
}

#[async_trait]
impl BasketRepository for RedisBasketRepository {
    async fn get(&self, user_id: &str) -> Result<Option<ShoppingCart>> {
        self.read_raw(user_id)
            .await?
            .as_deref()
            .map(parse_cart)
            .transpose()
    }

    async fn save(&self, cart: &ShoppingCart) -> Result<()> {
        let current_ids = cart.product_ids();
        let json = serde_json::to_string(cart)?;

        for attempt in 1..=SWAP_ATTEMPTS {
            let previous = self.read_raw(&cart.user_id).await?;
            let stale: Vec<i64> = match previous.as_deref() {
                Some(raw) => parse_cart(raw)?
                    .product_ids()
                    .into_iter()
                    .filter(|id| !current_ids.contains(id))
                    .collect(),
                None => Vec::new(),
            };

            if self
                .swap(&cart.user_id, previous.as_deref(), Some(&json), &current_ids, &stale)
                .await?
            {
                debug!(
                    subsystem = "basket",
                    component = "redis",
                    op = "save",
                    user_id = %cart.user_id,
                    item_count = cart.items.len(),
                    attempt,
                    "Cart stored"
                );
                return Ok(());
            }
            debug!(user_id = %cart.user_id, attempt, "Cart changed during save, retrying");
        }
        Err(contended(&cart.user_id))
    }

    async fn patch_price(&self, user_id: &str, product_id: i64, price: Decimal) -> Result<bool> {
        for attempt in 1..=SWAP_ATTEMPTS {
            let Some(raw) = self.read_raw(user_id).await? else {
                return Ok(false);
            };
            let mut cart = parse_cart(&raw)?;
            if !cart.contains_product(product_id) {
                return Ok(false);
            }
            for item in cart.items.iter_mut().filter(|i| i.product_id == product_id) {
                item.price = price;
            }
            let json = serde_json::to_string(&cart)?;

            if self.swap(user_id, Some(&raw), Some(&json), &[], &[]).await? {
                debug!(
                    subsystem = "basket",
                    component = "redis",
                    op = "patch_price",
                    %user_id,
                    product_id,
                    attempt,
                    "Cart price patched"
                );
                return Ok(true);
            }
            debug!(%user_id, product_id, attempt, "Cart changed during price patch, retrying");
        }
        Err(contended(user_id))
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        for attempt in 1..=SWAP_ATTEMPTS {
            let Some(raw) = self.read_raw(user_id).await? else {
                return Ok(false);
            };
            let indexed = parse_cart(&raw)?.product_ids();

            if self.swap(user_id, Some(&raw), None, &[], &indexed).await? {
                return Ok(true);
            }
            debug!(%user_id, attempt, "Cart changed during delete, retrying");
        }
        Err(contended(user_id))
    }

    async fn user_ids_for_product(&self, product_id: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut users: Vec<String> = conn
            .smembers(index_key(product_id))
            .await
            .map_err(cache_err)?;
        users.sort();
        Ok(users)
    }

    async fn unlink_product(&self, product_id: i64, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(index_key(product_id), user_id)
            .await
            .map_err(cache_err)?;
        Ok(())
    }
}
