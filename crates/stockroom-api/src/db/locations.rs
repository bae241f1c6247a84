//! Location persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::state::LocationRecord;

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: i64,
    code: String,
    name: String,
    address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<LocationRow> for LocationRecord {
    fn from(row: LocationRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            address: row.address,
            created_at: row.created_at,
        }
    }
}

pub async fn upsert(pool: &PgPool, record: &LocationRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO locations (id, code, name, address, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET
             code = EXCLUDED.code,
             name = EXCLUDED.name,
             address = EXCLUDED.address",
    )
    .bind(record.id)
    .bind(&record.code)
    .bind(&record.name)
    .bind(&record.address)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a location. Its inventory rows go with it (`ON DELETE CASCADE`).
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM locations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<LocationRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LocationRow>(
        "SELECT id, code, name, address, created_at FROM locations ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(LocationRecord::from).collect())
}
