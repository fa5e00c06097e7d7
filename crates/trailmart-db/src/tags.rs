//! Tag lookups. Tag rows are written through product enrichment.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use trailmart_core::{Error, ProductTag, Result, TagRepository};

/// PostgreSQL implementation of TagRepository.
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<ProductTag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT id, name FROM tag WHERE name = ANY($1) ORDER BY name")
            .bind(names)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ProductTag {
                id: Some(row.get("id")),
                name: row.get("name"),
            })
            .collect())
    }
}
