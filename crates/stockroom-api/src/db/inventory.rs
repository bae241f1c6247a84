//! Inventory level persistence.
//!
//! Transfers write both affected rows in one transaction so a crash can
//! never persist the debit without the credit.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::state::InventoryRecord;

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: i64,
    product_id: i64,
    location_id: i64,
    quantity: i64,
    created_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(row: InventoryRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            quantity: row.quantity,
            created_at: row.created_at,
        }
    }
}

const UPSERT: &str = "INSERT INTO inventory_items
         (id, product_id, location_id, quantity, created_at)
     VALUES ($1, $2, $3, $4, $5)
     ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity";

pub async fn upsert(pool: &PgPool, record: &InventoryRecord) -> Result<(), sqlx::Error> {
    sqlx::query(UPSERT)
        .bind(record.id)
        .bind(record.product_id)
        .bind(record.location_id)
        .bind(record.quantity)
        .bind(record.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

async fn upsert_in(
    tx: &mut Transaction<'_, Postgres>,
    record: &InventoryRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(UPSERT)
        .bind(record.id)
        .bind(record.product_id)
        .bind(record.location_id)
        .bind(record.quantity)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Persist the source and destination rows of a transfer atomically.
pub async fn upsert_transfer(
    pool: &PgPool,
    source: &InventoryRecord,
    destination: &InventoryRecord,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    upsert_in(&mut tx, source).await?;
    upsert_in(&mut tx, destination).await?;
    tx.commit().await
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<InventoryRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, InventoryRow>(
        "SELECT id, product_id, location_id, quantity, created_at
         FROM inventory_items ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(InventoryRecord::from).collect())
}
