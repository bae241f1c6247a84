//! # stockroom-api: Inventory HTTP Service
//!
//! Axum service for products, categories, locations, stock levels, unit
//! costs, stock reports and outbound webhooks, with role-based access on
//! bearer JWTs and a per-client sliding-window rate limiter.
//!
//! ## API Surface
//!
//! | Prefix           | Module                   | Guard (write / read)    |
//! |------------------|--------------------------|-------------------------|
//! | `/`, `/health`, `/metrics`, `/_config` | [`routes::health`] | public / optional auth |
//! | `/auth/*`        | [`routes::auth`]         | public, `me` any caller |
//! | `/users/*`       | [`routes::users`]        | admin                   |
//! | `/categories/*`  | [`routes::categories`]   | staff / readers         |
//! | `/locations/*`   | [`routes::locations`]    | staff / readers         |
//! | `/products/*`    | [`routes::products`]     | staff / readers         |
//! | `/inventory/*`   | [`routes::inventory`]    | staff / readers         |
//! | `/costs`         | [`routes::costs`]        | staff / readers         |
//! | `/reporting/*`   | [`routes::reporting`]    | readers                 |
//! | `/webhooks/*`    | [`routes::webhooks`]     | staff / readers         |
//!
//! Deletes are admin-only throughout.
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! CORS → Trace → SecurityHeaders → Metrics → RateLimit → BodyLimit → Handler (auth extractors)
//! ```
//!
//! The limiter runs before any credential is inspected, so unauthenticated
//! floods are throttled too.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod webhooks;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware::from_fn;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::middleware::metrics::metrics_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::security_headers::security_headers_middleware;
use crate::state::AppState;

/// Maximum accepted request body.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allow_origins);
    let limiter = state.rate_limiter.clone();
    let metrics = state.metrics.clone();

    Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::categories::router())
        .merge(routes::locations::router())
        .merge(routes::products::router())
        .merge(routes::inventory::router())
        .merge(routes::costs::router())
        .merge(routes::reporting::router())
        .merge(routes::webhooks::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(from_fn(rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(cors)
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state)
}

/// CORS policy from the configured origin list. `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}
