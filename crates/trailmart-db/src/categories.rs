//! Category repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use trailmart_core::{CategoryRepository, Error, ProductCategory, Result};

/// PostgreSQL implementation of CategoryRepository.
pub struct PgCategoryRepository {
    pool: Pool<Postgres>,
}

impl PgCategoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn create(&self, name: &str) -> Result<ProductCategory> {
        let row = sqlx::query("INSERT INTO category (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(ProductCategory {
            id: row.get("id"),
            name: row.get("name"),
        })
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM category WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("found"))
    }

    async fn list(&self) -> Result<Vec<ProductCategory>> {
        let rows = sqlx::query("SELECT id, name FROM category ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ProductCategory {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}
