//! Synchronous product lookup used by the basket to resolve name and price.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use trailmart_core::defaults::HTTP_TIMEOUT_SECS;
use trailmart_core::{Error, ProductLookup, ProductRepository, ProductSnapshot, Result};

/// Lookup against the catalog repository in the same process.
pub struct LocalProductLookup {
    products: Arc<dyn ProductRepository>,
}

impl LocalProductLookup {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl ProductLookup for LocalProductLookup {
    async fn get_product(&self, product_id: i64) -> Result<Option<ProductSnapshot>> {
        Ok(self
            .products
            .fetch(product_id)
            .await?
            .as_ref()
            .map(ProductSnapshot::from))
    }
}

/// Lookup against a remote catalog's `GET /products/{id}/lookup`.
pub struct HttpProductLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductLookup {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build lookup client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProductLookup for HttpProductLookup {
    #[instrument(skip(self), fields(subsystem = "basket", component = "catalog_lookup", op = "get_product"))]
    async fn get_product(&self, product_id: i64) -> Result<Option<ProductSnapshot>> {
        let url = format!("{}/products/{}/lookup", self.base_url, product_id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Catalog reports product missing");
                Ok(None)
            }
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Upstream(format!(
                    "Catalog lookup returned {status}: {body}"
                )))
            }
        }
    }
}
