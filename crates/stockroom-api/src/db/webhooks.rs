//! Webhook target persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::state::WebhookRecord;

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: i64,
    name: String,
    url: String,
    secret: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<WebhookRow> for WebhookRecord {
    fn from(row: WebhookRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            url: row.url,
            secret: row.secret,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

pub async fn upsert(pool: &PgPool, record: &WebhookRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO webhooks (id, name, url, secret, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE SET
             name = EXCLUDED.name,
             url = EXCLUDED.url,
             secret = EXCLUDED.secret,
             is_active = EXCLUDED.is_active",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.url)
    .bind(&record.secret)
    .bind(record.is_active)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<WebhookRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, WebhookRow>(
        "SELECT id, name, url, secret, is_active, created_at FROM webhooks ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(WebhookRecord::from).collect())
}
