//! Product persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::state::ProductRecord;

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    sku: String,
    name: String,
    description: Option<String>,
    category_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            name: row.name,
            description: row.description,
            category_id: row.category_id,
            created_at: row.created_at,
        }
    }
}

pub async fn upsert(pool: &PgPool, record: &ProductRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO products (id, sku, name, description, category_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE SET
             sku = EXCLUDED.sku,
             name = EXCLUDED.name,
             description = EXCLUDED.description,
             category_id = EXCLUDED.category_id",
    )
    .bind(record.id)
    .bind(&record.sku)
    .bind(&record.name)
    .bind(&record.description)
    .bind(record.category_id)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a product. Inventory rows and costs cascade.
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<ProductRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, sku, name, description, category_id, created_at FROM products ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ProductRecord::from).collect())
}
