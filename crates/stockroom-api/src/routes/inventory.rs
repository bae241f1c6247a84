//! # Inventory
//!
//! One stock row per (product, location) pair. `POST /inventory` sets the
//! quantity for a pair, creating the row when needed. Transfers move stock
//! between two locations under a single write lock on the inventory table,
//! so concurrent transfers can never drive a row negative.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Authenticated, Readers, Staff};
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::state::{AppState, InventoryRecord};

const INVALID_REFERENCE: &str = "Invalid product or location";
const ROW_VANISHED: &str = "inventory row vanished mid-write";

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetInventoryRequest {
    pub product_id: i64,
    pub location_id: i64,
    pub quantity: i64,
}

impl Validate for SetInventoryRequest {
    fn validate(&self) -> Result<(), String> {
        check_quantity(self.quantity)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateInventoryRequest {
    pub quantity: i64,
}

impl Validate for UpdateInventoryRequest {
    fn validate(&self) -> Result<(), String> {
        check_quantity(self.quantity)
    }
}

fn check_quantity(quantity: i64) -> Result<(), String> {
    if quantity < 0 {
        return Err("quantity must be greater than or equal to 0".to_string());
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransferParams {
    pub product_id: i64,
    pub from_location_id: i64,
    pub to_location_id: i64,
    pub quantity: i64,
}

/// Outcome of [`apply_transfer`] on the inventory table.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub source: InventoryRecord,
    pub destination: InventoryRecord,
    /// Rows as they were before the move; `None` for rows the transfer created.
    pub previous: [Option<InventoryRecord>; 2],
}

/// Find the row for a pair, creating an empty one if absent.
fn row_for(
    rows: &mut BTreeMap<i64, InventoryRecord>,
    next_id: &dyn Fn() -> i64,
    product_id: i64,
    location_id: i64,
    now: DateTime<Utc>,
) -> (i64, Option<InventoryRecord>) {
    if let Some(row) = rows
        .values()
        .find(|r| r.product_id == product_id && r.location_id == location_id)
    {
        return (row.id, Some(row.clone()));
    }
    let id = next_id();
    rows.insert(
        id,
        InventoryRecord {
            id,
            product_id,
            location_id,
            quantity: 0,
            created_at: now,
        },
    );
    (id, None)
}

/// Move `quantity` of a product from one location to another.
///
/// Missing rows are created at zero. On insufficient stock, or when the
/// destination total would not fit in an `i64`, nothing is changed,
/// including rows that would have been created.
pub fn apply_transfer(
    rows: &mut BTreeMap<i64, InventoryRecord>,
    next_id: &dyn Fn() -> i64,
    params: &TransferParams,
    now: DateTime<Utc>,
) -> Result<Transfer, AppError> {
    if params.quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".to_string()));
    }
    if params.from_location_id == params.to_location_id {
        return Err(AppError::BadRequest(
            "Source and destination locations must differ".to_string(),
        ));
    }

    let (src_id, src_before) = row_for(
        rows,
        next_id,
        params.product_id,
        params.from_location_id,
        now,
    );
    let (dst_id, dst_before) = row_for(
        rows,
        next_id,
        params.product_id,
        params.to_location_id,
        now,
    );

    let source = rows.get(&src_id).cloned();
    let destination = rows.get(&dst_id).cloned();
    let (Some(source), Some(destination)) = (source, destination) else {
        return Err(AppError::Internal(ROW_VANISHED.to_string()));
    };
    let outcome = if source.quantity < params.quantity {
        Err("Insufficient quantity")
    } else {
        destination
            .quantity
            .checked_add(params.quantity)
            .ok_or("Destination quantity would overflow")
    };
    let received = match outcome {
        Ok(received) => received,
        Err(message) => {
            if src_before.is_none() {
                rows.remove(&src_id);
            }
            if dst_before.is_none() {
                rows.remove(&dst_id);
            }
            return Err(AppError::BadRequest(message.to_string()));
        }
    };

    let source = InventoryRecord {
        quantity: source.quantity - params.quantity,
        ..source
    };
    let destination = InventoryRecord {
        quantity: received,
        ..destination
    };
    rows.insert(src_id, source.clone());
    rows.insert(dst_id, destination.clone());

    Ok(Transfer {
        source,
        destination,
        previous: [src_before, dst_before],
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_inventory).post(set_inventory))
        .route("/inventory/:id", patch(update_inventory))
        .route("/inventory/transfer", post(transfer))
}

/// Put back what a failed write replaced.
fn restore(state: &AppState, ids: &[i64], previous: &[Option<InventoryRecord>]) {
    state.inventory.with_write(|rows, _| {
        for (id, before) in ids.iter().zip(previous) {
            match before {
                Some(row) => {
                    rows.insert(*id, row.clone());
                }
                None => {
                    rows.remove(id);
                }
            }
        }
    });
}

/// POST /inventory: Create or set the stock row for a product at a location.
#[utoipa::path(
    post,
    path = "/inventory",
    request_body = SetInventoryRequest,
    responses(
        (status = 200, description = "Stock row set", body = InventoryRecord),
        (status = 400, description = "Invalid product or location", body = crate::error::ErrorBody),
        (status = 422, description = "Negative quantity", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
async fn set_inventory(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    body: Result<Json<SetInventoryRequest>, JsonRejection>,
) -> Result<Json<InventoryRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let _locations = state.locations.lock_writes().await;
    let _products = state.products.lock_writes().await;
    let _writes = state.inventory.lock_writes().await;
    if !state.products.contains(req.product_id) || !state.locations.contains(req.location_id) {
        return Err(AppError::BadRequest(INVALID_REFERENCE.to_string()));
    }

    let now = state.now();
    let (record, before) = state
        .inventory
        .with_write(|rows, next_id| {
            let (id, before) = row_for(rows, next_id, req.product_id, req.location_id, now);
            let row = rows.get_mut(&id)?;
            row.quantity = req.quantity;
            Some((row.clone(), before))
        })
        .ok_or_else(|| AppError::Internal(ROW_VANISHED.to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::inventory::upsert(pool, &record).await {
            restore(&state, &[record.id], &[before]);
            return Err(db::persist_failed("inventory_items", e));
        }
    }

    Ok(Json(record))
}

/// GET /inventory: All stock rows.
#[utoipa::path(
    get,
    path = "/inventory",
    responses((status = 200, description = "Stock rows", body = Vec<InventoryRecord>)),
    security(("bearer" = [])),
    tag = "inventory"
)]
async fn list_inventory(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
) -> Json<Vec<InventoryRecord>> {
    Json(state.inventory.list())
}

/// PATCH /inventory/:id: Set the quantity of an existing row.
#[utoipa::path(
    patch,
    path = "/inventory/{id}",
    params(("id" = i64, Path, description = "Inventory row id")),
    request_body = UpdateInventoryRequest,
    responses(
        (status = 200, description = "Quantity set", body = InventoryRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Negative quantity", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
async fn update_inventory(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateInventoryRequest>, JsonRejection>,
) -> Result<Json<InventoryRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.inventory.lock_writes().await;
    let before = state.inventory.get(id).ok_or_else(AppError::not_found)?;
    let updated = state
        .inventory
        .update(id, |row| row.quantity = req.quantity)
        .ok_or_else(AppError::not_found)?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::inventory::upsert(pool, &updated).await {
            restore(&state, &[id], &[Some(before)]);
            return Err(db::persist_failed("inventory_items", e));
        }
    }

    Ok(Json(updated))
}

/// POST /inventory/transfer: Move stock between two locations.
///
/// Returns the source and destination rows after the move.
#[utoipa::path(
    post,
    path = "/inventory/transfer",
    params(TransferParams),
    responses(
        (status = 200, description = "Transfer applied", body = Vec<InventoryRecord>),
        (status = 400, description = "Non-positive quantity, same location, unknown reference or insufficient stock", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
async fn transfer(
    State(state): State<AppState>,
    caller: Authenticated<Staff>,
    params: Result<Query<TransferParams>, QueryRejection>,
) -> Result<Json<Vec<InventoryRecord>>, AppError> {
    let params = extract_query(params)?;
    let _locations = state.locations.lock_writes().await;
    let _products = state.products.lock_writes().await;
    let _writes = state.inventory.lock_writes().await;
    if !state.products.contains(params.product_id)
        || !state.locations.contains(params.from_location_id)
        || !state.locations.contains(params.to_location_id)
    {
        return Err(AppError::BadRequest(INVALID_REFERENCE.to_string()));
    }

    let now = state.now();
    let moved = state
        .inventory
        .with_write(|rows, next_id| apply_transfer(rows, next_id, &params, now))?;

    if let Some(pool) = &state.db_pool {
        let written = db::inventory::upsert_transfer(pool, &moved.source, &moved.destination);
        if let Err(e) = written.await {
            restore(
                &state,
                &[moved.source.id, moved.destination.id],
                &moved.previous,
            );
            return Err(db::persist_failed("inventory_items", e));
        }
    }

    tracing::info!(
        product_id = params.product_id,
        from = params.from_location_id,
        to = params.to_location_id,
        quantity = params.quantity,
        by = %caller.username(),
        "stock transferred"
    );
    Ok(Json(vec![moved.source, moved.destination]))
}
