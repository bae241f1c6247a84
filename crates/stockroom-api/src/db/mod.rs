//! # Database Persistence Layer
//!
//! Optional Postgres write-through via SQLx.
//!
//! When `DATABASE_URL` is set, every mutation of an in-memory store is
//! written to Postgres, and the stores are hydrated from it at startup.
//! When absent, the API runs in-memory only (development and tests).
//!
//! Each submodule owns one table and exposes `upsert`, `delete` and
//! `load_all`. Uniqueness is checked in memory first; the table constraints
//! are a second line.

pub mod categories;
pub mod costs;
pub mod inventory;
pub mod locations;
pub mod products;
pub mod users;
pub mod webhooks;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::AppError;

/// Connect and run embedded migrations.
///
/// Returns `None` when no URL is configured (in-memory-only mode).
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Log a failed write and convert it into a masked 500.
pub fn persist_failed(table: &'static str, err: sqlx::Error) -> AppError {
    tracing::error!(table, error = %err, "failed to persist to database");
    AppError::Internal(format!("database write to {table} failed"))
}
