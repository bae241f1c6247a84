//! # Stock Locations
//!
//! Warehouses and other places that hold stock, identified by a unique
//! short code. Deleting a location drops its inventory rows.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{AdminOnly, Authenticated, Readers, Staff};
use crate::db;
use crate::error::AppError;
use crate::extractors::{check_len, check_required, extract_validated_json, Validate};
use crate::routes::MessageResponse;
use crate::state::{AppState, LocationRecord};

const DUPLICATE: &str = "Location code exists";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLocationRequest {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
}

impl Validate for CreateLocationRequest {
    fn validate(&self) -> Result<(), String> {
        check_required("code", &self.code, 32)?;
        check_required("name", &self.name, 100)?;
        if let Some(address) = &self.address {
            check_len("address", address, 255)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLocationRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
}

impl Validate for UpdateLocationRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(code) = &self.code {
            check_required("code", code, 32)?;
        }
        if let Some(name) = &self.name {
            check_required("name", name, 100)?;
        }
        if let Some(address) = &self.address {
            check_len("address", address, 255)?;
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/locations", get(list_locations).post(create_location))
        .route(
            "/locations/:id",
            get(get_location)
                .patch(update_location)
                .delete(delete_location),
        )
}

/// POST /locations: Register a location.
#[utoipa::path(
    post,
    path = "/locations",
    request_body = CreateLocationRequest,
    responses(
        (status = 201, description = "Location created", body = LocationRecord),
        (status = 409, description = "Code already used", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "locations"
)]
async fn create_location(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    body: Result<Json<CreateLocationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LocationRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.locations.lock_writes().await;
    let now = state.now();
    let record = state
        .locations
        .try_insert(
            |l| l.code == req.code,
            |id| LocationRecord {
                id,
                code: req.code.clone(),
                name: req.name.clone(),
                address: req.address.clone(),
                created_at: now,
            },
        )
        .ok_or_else(|| AppError::Conflict(DUPLICATE.to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::locations::upsert(pool, &record).await {
            state.locations.remove(record.id);
            return Err(db::persist_failed("locations", e));
        }
    }

    tracing::info!(code = %record.code, "location created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /locations: List locations, newest first.
#[utoipa::path(
    get,
    path = "/locations",
    responses((status = 200, description = "All locations", body = Vec<LocationRecord>)),
    security(("bearer" = [])),
    tag = "locations"
)]
async fn list_locations(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
) -> Json<Vec<LocationRecord>> {
    let mut locations = state.locations.list();
    locations.reverse();
    Json(locations)
}

/// GET /locations/:id
#[utoipa::path(
    get,
    path = "/locations/{id}",
    params(("id" = i64, Path, description = "Location id")),
    responses(
        (status = 200, description = "Location found", body = LocationRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "locations"
)]
async fn get_location(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
    Path(id): Path<i64>,
) -> Result<Json<LocationRecord>, AppError> {
    state
        .locations
        .get(id)
        .map(Json)
        .ok_or_else(AppError::not_found)
}

/// PATCH /locations/:id
#[utoipa::path(
    patch,
    path = "/locations/{id}",
    params(("id" = i64, Path, description = "Location id")),
    request_body = UpdateLocationRequest,
    responses(
        (status = 200, description = "Location updated", body = LocationRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Code already used", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "locations"
)]
async fn update_location(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateLocationRequest>, JsonRejection>,
) -> Result<Json<LocationRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.locations.lock_writes().await;
    let (before, updated) = state.locations.with_write(|locations, _| {
        if let Some(code) = &req.code {
            if locations.values().any(|l| l.id != id && &l.code == code) {
                return Err(AppError::Conflict(DUPLICATE.to_string()));
            }
        }
        let location = locations.get_mut(&id).ok_or_else(AppError::not_found)?;
        let before = location.clone();
        if let Some(code) = req.code {
            location.code = code;
        }
        if let Some(name) = req.name {
            location.name = name;
        }
        if let Some(address) = req.address {
            location.address = Some(address);
        }
        Ok((before, location.clone()))
    })?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::locations::upsert(pool, &updated).await {
            state.locations.insert(id, before);
            return Err(db::persist_failed("locations", e));
        }
    }

    Ok(Json(updated))
}

/// DELETE /locations/:id: Delete a location and the stock recorded there.
#[utoipa::path(
    delete,
    path = "/locations/{id}",
    params(("id" = i64, Path, description = "Location id")),
    responses(
        (status = 200, description = "Location deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "locations"
)]
async fn delete_location(
    State(state): State<AppState>,
    caller: Authenticated<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let _writes = state.locations.lock_writes().await;
    let _inventory = state.inventory.lock_writes().await;
    if !state.locations.contains(id) {
        return Err(AppError::not_found());
    }
    if let Some(pool) = &state.db_pool {
        db::locations::delete(pool, id)
            .await
            .map_err(|e| db::persist_failed("locations", e))?;
    }

    let removed = state.locations.remove(id).ok_or_else(AppError::not_found)?;
    let dropped = state.inventory.with_write(|rows, _| {
        let before = rows.len();
        rows.retain(|_, row| row.location_id != id);
        before - rows.len()
    });

    tracing::info!(
        code = %removed.code,
        inventory_rows = dropped,
        by = %caller.username(),
        "location deleted"
    );
    Ok(Json(MessageResponse::deleted()))
}
