//! Cost history persistence. Costs are append-only.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::state::CostRecord;

#[derive(sqlx::FromRow)]
struct CostRow {
    id: i64,
    product_id: i64,
    unit_cost: f64,
    currency: String,
    effective_at: DateTime<Utc>,
}

impl From<CostRow> for CostRecord {
    fn from(row: CostRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            unit_cost: row.unit_cost,
            currency: row.currency,
            effective_at: row.effective_at,
        }
    }
}

pub async fn insert(pool: &PgPool, record: &CostRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO costs (id, product_id, unit_cost, currency, effective_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(record.id)
    .bind(record.product_id)
    .bind(record.unit_cost)
    .bind(&record.currency)
    .bind(record.effective_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<CostRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CostRow>(
        "SELECT id, product_id, unit_cost, currency, effective_at FROM costs ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CostRecord::from).collect())
}
