//! # Health Checks and Service Introspection
//!
//! - `GET /`: service banner
//! - `GET /health`: liveness
//! - `GET /metrics`: request counters
//! - `GET /_config`: masked configuration (optional auth)

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::MaybeAuthenticated;
use crate::middleware::metrics::MetricsSnapshot;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigView {
    /// Configuration with secrets replaced by `***`.
    #[schema(value_type = Object)]
    pub config: serde_json::Value,
    /// Username of the caller, when a valid token was presented.
    pub caller: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/_config", get(config_view))
}

/// GET /: Service banner.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service is up", body = ServiceInfo)),
    tag = "health"
)]
async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: "healthy".to_string(),
        service: state.config.app_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health: Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is running", body = HealthStatus)),
    tag = "health"
)]
async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}

/// GET /metrics: Request counters.
#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Counter snapshot", body = MetricsSnapshot)),
    tag = "health"
)]
async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /_config: Masked configuration and the caller, if any.
#[utoipa::path(
    get,
    path = "/_config",
    responses(
        (status = 200, description = "Masked configuration", body = ConfigView),
        (status = 500, description = "Identity lookup failed", body = crate::error::ErrorBody),
    ),
    tag = "health"
)]
async fn config_view(
    State(state): State<AppState>,
    MaybeAuthenticated(caller): MaybeAuthenticated,
) -> Json<ConfigView> {
    Json(ConfigView {
        config: state.config.masked(),
        caller: caller.map(|identity| identity.username),
    })
}
