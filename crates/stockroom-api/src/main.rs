//! # stockroom-api: Binary Entry Point
//!
//! Loads configuration from the environment, connects the optional
//! database, and serves the API until Ctrl-C.

use std::net::SocketAddr;
use std::time::Duration;

use stockroom_api::config::AppConfig;
use stockroom_api::middleware::rate_limit::RateLimiter;
use stockroom_api::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_level);

    for var in config.default_secrets() {
        tracing::warn!(
            var,
            "secret is set to its shipped default; override it before deploying"
        );
    }

    let database_url = config.database_url.as_ref().map(|url| url.as_str());
    let db_pool = stockroom_api::db::init_pool(database_url)
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let port = config.port;
    let state = AppState::new(config, db_pool).map_err(|e| {
        tracing::error!("Failed to build application state: {e}");
        e
    })?;

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    spawn_limiter_sweep(state.rate_limiter.clone());

    let app = stockroom_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Stockroom API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over `LOG_LEVEL`. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));
    let json = std::env::var("LOG_FORMAT")
        .is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Periodically drop limiter keys whose whole window has expired.
fn spawn_limiter_sweep(limiter: RateLimiter) {
    let period = Duration::from_secs(limiter.config().window_secs.max(1).unsigned_abs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = limiter.tracked_keys(),
                    "swept idle rate-limit keys"
                );
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
