//! Product repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, Pool, Postgres, Row};
use tracing::debug;

use trailmart_core::{
    Error, Product, ProductDraft, ProductEnrichment, ProductImage, ProductRepository, ProductTag,
    ProductVariant, Result,
};

use crate::escape_like;

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.brand, p.rich_description,
           p.is_rich_description_ai_generated, p.base_price, p.is_active,
           p.created_at, p.category_id, c.name AS category_name
    FROM product p
    LEFT JOIN category c ON c.id = p.category_id
"#;

/// PostgreSQL implementation of ProductRepository.
pub struct PgProductRepository {
    pool: Pool<Postgres>,
}

impl PgProductRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Attach images, variants and tags to a batch of product rows.
    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Product>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();

        let mut images: HashMap<i64, Vec<ProductImage>> = HashMap::new();
        for row in sqlx::query(
            "SELECT product_id, url, is_primary FROM product_image
             WHERE product_id = ANY($1) ORDER BY product_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?
        {
            images
                .entry(row.get("product_id"))
                .or_default()
                .push(ProductImage {
                    url: row.get("url"),
                    is_primary: row.get("is_primary"),
                });
        }

        let mut variants: HashMap<i64, Vec<ProductVariant>> = HashMap::new();
        for row in sqlx::query(
            "SELECT product_id, sku, price, stock_quantity, image_url, color, size, material
             FROM product_variant WHERE product_id = ANY($1) ORDER BY product_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?
        {
            variants
                .entry(row.get("product_id"))
                .or_default()
                .push(ProductVariant {
                    sku: row.get("sku"),
                    price: row.get("price"),
                    stock_quantity: row.get("stock_quantity"),
                    image_url: row.get("image_url"),
                    color: row.get("color"),
                    size: row.get("size"),
                    material: row.get("material"),
                });
        }

        let mut tags: HashMap<i64, Vec<ProductTag>> = HashMap::new();
        for row in sqlx::query(
            "SELECT pt.product_id, t.id, t.name FROM product_tag pt
             JOIN tag t ON t.id = pt.tag_id
             WHERE pt.product_id = ANY($1) ORDER BY pt.product_id, t.name",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?
        {
            tags.entry(row.get("product_id"))
                .or_default()
                .push(ProductTag {
                    id: Some(row.get("id")),
                    name: row.get("name"),
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                Product {
                    id,
                    name: row.get("name"),
                    description: row.get("description"),
                    brand: row.get("brand"),
                    rich_description: row.get("rich_description"),
                    is_rich_description_ai_generated: row.get("is_rich_description_ai_generated"),
                    base_price: row.get("base_price"),
                    is_active: row.get("is_active"),
                    created_at: row.get("created_at"),
                    category_id: row.get("category_id"),
                    category_name: row.get("category_name"),
                    images: images.remove(&id).unwrap_or_default(),
                    variants: variants.remove(&id).unwrap_or_default(),
                    tags: tags.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn fetch_required(&self, id: i64) -> Result<Product> {
        self.fetch(id).await?.ok_or(Error::ProductNotFound(id))
    }
}

async fn insert_children(
    conn: &mut PgConnection,
    product_id: i64,
    images: &[ProductImage],
    variants: &[ProductVariant],
) -> Result<()> {
    for (position, image) in images.iter().enumerate() {
        sqlx::query(
            "INSERT INTO product_image (product_id, position, url, is_primary)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(product_id)
        .bind(position as i32)
        .bind(&image.url)
        .bind(image.is_primary)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }

    for (position, variant) in variants.iter().enumerate() {
        sqlx::query(
            "INSERT INTO product_variant
                (product_id, position, sku, price, stock_quantity, image_url, color, size, material)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(product_id)
        .bind(position as i32)
        .bind(&variant.sku)
        .bind(variant.price)
        .bind(variant.stock_quantity)
        .bind(&variant.image_url)
        .bind(&variant.color)
        .bind(&variant.size)
        .bind(&variant.material)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }
    Ok(())
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn insert(&self, draft: ProductDraft) -> Result<Product> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            r#"
            INSERT INTO product (name, description, brand, rich_description,
                                 is_rich_description_ai_generated, base_price, is_active, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.brand)
        .bind(&draft.rich_description)
        .bind(draft.is_rich_description_ai_generated)
        .bind(draft.base_price)
        .bind(draft.is_active)
        .bind(draft.category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let id: i64 = row.get("id");

        insert_children(&mut tx, id, &draft.images, &draft.variants).await?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(subsystem = "database", component = "products", op = "insert", product_id = id, "Product inserted");
        self.fetch_required(id).await
    }

    async fn replace(&self, id: i64, draft: ProductDraft) -> Result<Option<Product>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            r#"
            UPDATE product
            SET name = $2, description = $3, brand = $4, rich_description = $5,
                is_rich_description_ai_generated = $6, base_price = $7,
                is_active = $8, category_id = $9
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.brand)
        .bind(&draft.rich_description)
        .bind(draft.is_rich_description_ai_generated)
        .bind(draft.base_price)
        .bind(draft.is_active)
        .bind(draft.category_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM product_image WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM product_variant WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        insert_children(&mut tx, id, &draft.images, &draft.variants).await?;
        tx.commit().await.map_err(Error::Database)?;

        self.fetch(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn fetch_many(&self, ids: &[i64]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!("{PRODUCT_SELECT} WHERE p.id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        self.hydrate(rows).await
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!("{PRODUCT_SELECT} ORDER BY p.id"))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        self.hydrate(rows).await
    }

    async fn search_by_name(&self, query: &str) -> Result<Vec<Product>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            "{PRODUCT_SELECT} WHERE p.name LIKE $1 ESCAPE '\\' ORDER BY p.id"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        self.hydrate(rows).await
    }

    async fn save_enrichment(&self, enrichment: &ProductEnrichment) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let current: Option<Option<String>> =
            sqlx::query_scalar("SELECT rich_description FROM product WHERE id = $1 FOR UPDATE")
                .bind(enrichment.product_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let Some(current) = current else {
            return Err(Error::ProductNotFound(enrichment.product_id));
        };

        let mut description_written = false;
        if let Some(update) = &enrichment.rich_description {
            if current == update.previous {
                sqlx::query(
                    "UPDATE product SET rich_description = $2, is_rich_description_ai_generated = TRUE
                     WHERE id = $1",
                )
                .bind(enrichment.product_id)
                .bind(&update.text)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                description_written = true;
            } else {
                debug!(
                    subsystem = "database",
                    component = "products",
                    product_id = enrichment.product_id,
                    "Rich description changed since generation, keeping stored value"
                );
            }
        }

        let mut tag_count = None;
        if let Some(tags) = &enrichment.tags {
            let mut names: Vec<String> = Vec::with_capacity(tags.len());
            for name in tags {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }

            for name in &names {
                sqlx::query("INSERT INTO tag (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                    .bind(name)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
            }

            sqlx::query("DELETE FROM product_tag WHERE product_id = $1")
                .bind(enrichment.product_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;

            sqlx::query(
                "INSERT INTO product_tag (product_id, tag_id)
                 SELECT $1, id FROM tag WHERE name = ANY($2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(enrichment.product_id)
            .bind(&names)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            tag_count = Some(names.len());
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "products",
            op = "save_enrichment",
            product_id = enrichment.product_id,
            ?tag_count,
            description_written,
            "Enrichment saved"
        );
        Ok(())
    }
}
