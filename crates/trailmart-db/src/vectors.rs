//! pgvector-backed product similarity index.
//!
//! The collection is a single table keyed by product id holding the
//! product projection alongside its embedding. It is created on demand by
//! [`VectorIndex::ensure_collection`] because the embedding dimension is
//! only known once the embedding backend is configured.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::info;

use trailmart_core::defaults::VECTOR_COLLECTION;
use trailmart_core::{Error, ProductVector, Result, Vector, VectorIndex, VectorMatch};

/// PostgreSQL implementation of VectorIndex.
pub struct PgVectorIndex {
    pool: Pool<Postgres>,
    table: String,
}

impl PgVectorIndex {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_table(pool, VECTOR_COLLECTION)
    }

    /// Use a custom table name. Only `[A-Za-z0-9_]` is kept.
    pub fn with_table(pool: Pool<Postgres>, table: &str) -> Self {
        Self {
            pool,
            table: sanitize_identifier(table),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn collection_exists(&self) -> Result<bool> {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL AS found")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("found"))
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                product_id          BIGINT PRIMARY KEY,
                name                TEXT NOT NULL,
                description         TEXT NOT NULL,
                brand               TEXT NOT NULL,
                price               NUMERIC(12, 2) NOT NULL,
                primary_image_url   TEXT,
                embedding           vector({dimension}) NOT NULL
            )
            "#,
            table = self.table,
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "search",
            component = "vector_index",
            op = "ensure_collection",
            collection = %self.table,
            dimension,
            "Vector collection ready"
        );
        Ok(())
    }

    async fn upsert(&self, vector: ProductVector) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} (product_id, name, description, brand, price, primary_image_url, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                brand = EXCLUDED.brand,
                price = EXCLUDED.price,
                primary_image_url = EXCLUDED.primary_image_url,
                embedding = EXCLUDED.embedding
            "#,
            table = self.table,
        );
        sqlx::query(&sql)
            .bind(vector.product_id)
            .bind(&vector.name)
            .bind(&vector.description)
            .bind(&vector.brand)
            .bind(vector.price)
            .bind(&vector.primary_image_url)
            .bind(vector.embedding)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn search(&self, query: &Vector, top_n: usize) -> Result<Vec<VectorMatch>> {
        let sql = format!(
            r#"
            SELECT product_id, (1.0 - (embedding <=> $1::vector))::real AS score
            FROM {table}
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            table = self.table,
        );
        let rows = sqlx::query(&sql)
            .bind(query)
            .bind(top_n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| VectorMatch {
                product_id: row.get("product_id"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn delete(&self, product_id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE product_id = $1", self.table);
        sqlx::query(&sql)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
