//! # Webhook Registry and Manual Trigger
//!
//! - `POST /webhooks`, `GET /webhooks`, `PATCH /webhooks/:id`,
//!   `DELETE /webhooks/:id`: registry management
//! - `POST /webhooks/:id/trigger?event=`: send one signed notification
//!
//! Signing and delivery live in [`crate::webhooks`].

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{AdminOnly, Authenticated, Readers, Staff};
use crate::db;
use crate::error::AppError;
use crate::extractors::{check_len, check_required, extract_query, extract_validated_json, Validate};
use crate::routes::MessageResponse;
use crate::state::{AppState, WebhookRecord};

const DUPLICATE: &str = "Webhook name exists";

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("url is invalid: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("url must use http or https".to_string());
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("url must have a host".to_string());
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub url: String,
    /// Signing key for this target. Falls back to the service-wide secret.
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Validate for CreateWebhookRequest {
    fn validate(&self) -> Result<(), String> {
        check_required("name", &self.name, 128)?;
        validate_url(&self.url)?;
        if let Some(secret) = &self.secret {
            check_len("secret", secret, 256)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub is_active: Option<bool>,
}

impl Validate for UpdateWebhookRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            check_required("name", name, 128)?;
        }
        if let Some(url) = &self.url {
            validate_url(url)?;
        }
        if let Some(secret) = &self.secret {
            check_len("secret", secret, 256)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TriggerParams {
    /// Event name placed in the payload.
    pub event: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResult {
    /// HTTP status returned by the target.
    pub status_code: u16,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route(
            "/webhooks/:id",
            patch(update_webhook).delete(delete_webhook),
        )
        .route("/webhooks/:id/trigger", post(trigger_webhook))
}

/// POST /webhooks: Register a webhook target.
#[utoipa::path(
    post,
    path = "/webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook registered", body = WebhookRecord),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "webhooks"
)]
async fn create_webhook(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    body: Result<Json<CreateWebhookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WebhookRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.webhooks.lock_writes().await;
    let now = state.now();
    let record = state
        .webhooks
        .try_insert(
            |w| w.name == req.name,
            |id| WebhookRecord {
                id,
                name: req.name.clone(),
                url: req.url.clone(),
                secret: req.secret.clone(),
                is_active: req.is_active,
                created_at: now,
            },
        )
        .ok_or_else(|| AppError::Conflict(DUPLICATE.to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::webhooks::upsert(pool, &record).await {
            state.webhooks.remove(record.id);
            return Err(db::persist_failed("webhooks", e));
        }
    }

    tracing::info!(webhook = %record.name, "webhook registered");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /webhooks: List webhook targets. Secrets are never included.
#[utoipa::path(
    get,
    path = "/webhooks",
    responses((status = 200, description = "Registered webhooks", body = Vec<WebhookRecord>)),
    security(("bearer" = [])),
    tag = "webhooks"
)]
async fn list_webhooks(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
) -> Json<Vec<WebhookRecord>> {
    Json(state.webhooks.list())
}

/// PATCH /webhooks/:id
#[utoipa::path(
    patch,
    path = "/webhooks/{id}",
    params(("id" = i64, Path, description = "Webhook id")),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "Webhook updated", body = WebhookRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "webhooks"
)]
async fn update_webhook(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateWebhookRequest>, JsonRejection>,
) -> Result<Json<WebhookRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.webhooks.lock_writes().await;
    let (before, updated) = state.webhooks.with_write(|webhooks, _| {
        if let Some(name) = &req.name {
            if webhooks.values().any(|w| w.id != id && &w.name == name) {
                return Err(AppError::Conflict(DUPLICATE.to_string()));
            }
        }
        let webhook = webhooks.get_mut(&id).ok_or_else(AppError::not_found)?;
        let before = webhook.clone();
        if let Some(name) = req.name {
            webhook.name = name;
        }
        if let Some(url) = req.url {
            webhook.url = url;
        }
        if let Some(secret) = req.secret {
            webhook.secret = Some(secret);
        }
        if let Some(active) = req.is_active {
            webhook.is_active = active;
        }
        Ok((before, webhook.clone()))
    })?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::webhooks::upsert(pool, &updated).await {
            state.webhooks.insert(id, before);
            return Err(db::persist_failed("webhooks", e));
        }
    }

    Ok(Json(updated))
}

/// DELETE /webhooks/:id
#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    params(("id" = i64, Path, description = "Webhook id")),
    responses(
        (status = 200, description = "Webhook deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "webhooks"
)]
async fn delete_webhook(
    State(state): State<AppState>,
    _caller: Authenticated<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let _writes = state.webhooks.lock_writes().await;
    let removed = state.webhooks.remove(id).ok_or_else(AppError::not_found)?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::webhooks::delete(pool, id).await {
            state.webhooks.insert(id, removed);
            return Err(db::persist_failed("webhooks", e));
        }
    }

    Ok(Json(MessageResponse::deleted()))
}

/// POST /webhooks/:id/trigger: Send a signed `{"event": ...}` notification.
///
/// Any HTTP status from the target is reported back; only a transport
/// failure is an error.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/trigger",
    params(("id" = i64, Path, description = "Webhook id"), TriggerParams),
    responses(
        (status = 200, description = "Target responded", body = TriggerResult),
        (status = 404, description = "Webhook not found or inactive", body = crate::error::ErrorBody),
        (status = 502, description = "Failed to call webhook", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "webhooks"
)]
async fn trigger_webhook(
    State(state): State<AppState>,
    caller: Authenticated<Staff>,
    Path(id): Path<i64>,
    params: Result<Query<TriggerParams>, QueryRejection>,
) -> Result<Json<TriggerResult>, AppError> {
    let params = extract_query(params)?;
    let webhook = state
        .webhooks
        .get(id)
        .filter(|w| w.is_active)
        .ok_or_else(|| AppError::NotFound("Webhook not found or inactive".to_string()))?;

    match state
        .dispatcher
        .deliver(&webhook.url, &params.event, webhook.secret.as_deref())
        .await
    {
        Ok(status_code) => {
            tracing::info!(
                webhook = %webhook.name,
                event = %params.event,
                status = status_code,
                by = %caller.username(),
                "webhook triggered"
            );
            Ok(Json(TriggerResult { status_code }))
        }
        Err(e) => {
            tracing::error!(webhook = %webhook.name, error = %e, "failed to trigger webhook");
            Err(AppError::BadGateway("Failed to call webhook".to_string()))
        }
    }
}
