//! # Products
//!
//! Catalogue entries keyed by a unique SKU. Listing supports a
//! case-insensitive `q` filter over name and SKU and returns the newest
//! products first. Deleting a product drops its inventory rows and cost
//! history.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{AdminOnly, Authenticated, Readers, Staff};
use crate::db;
use crate::error::AppError;
use crate::extractors::{check_len, check_required, extract_query, extract_validated_json, Validate};
use crate::routes::MessageResponse;
use crate::state::{AppState, ProductRecord};

const DUPLICATE: &str = "SKU already exists";
const MISSING_CATEGORY: &str = "Invalid category";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
}

impl Validate for CreateProductRequest {
    fn validate(&self) -> Result<(), String> {
        check_required("sku", &self.sku, 64)?;
        check_required("name", &self.name, 255)?;
        if let Some(description) = &self.description {
            check_len("description", description, 2000)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
}

impl Validate for UpdateProductRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(sku) = &self.sku {
            check_required("sku", sku, 64)?;
        }
        if let Some(name) = &self.name {
            check_required("name", name, 255)?;
        }
        if let Some(description) = &self.description {
            check_len("description", description, 2000)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductFilter {
    /// Substring matched case-insensitively against name and SKU.
    pub q: Option<String>,
}

/// Whether `product` matches the search term. Blank terms match everything.
fn matches(product: &ProductRecord, q: &str) -> bool {
    let needle = q.trim().to_lowercase();
    needle.is_empty()
        || product.name.to_lowercase().contains(&needle)
        || product.sku.to_lowercase().contains(&needle)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product)
                .patch(update_product)
                .delete(delete_product),
        )
}

/// POST /products: Add a product to the catalogue.
#[utoipa::path(
    post,
    path = "/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductRecord),
        (status = 400, description = "Category does not exist", body = crate::error::ErrorBody),
        (status = 409, description = "SKU already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
async fn create_product(
    State(state): State<AppState>,
    caller: Authenticated<Staff>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let _categories = state.categories.lock_writes().await;
    let _writes = state.products.lock_writes().await;
    if let Some(category_id) = req.category_id {
        if !state.categories.contains(category_id) {
            return Err(AppError::BadRequest(MISSING_CATEGORY.to_string()));
        }
    }

    let now = state.now();
    let record = state
        .products
        .try_insert(
            |p| p.sku == req.sku,
            |id| ProductRecord {
                id,
                sku: req.sku.clone(),
                name: req.name.clone(),
                description: req.description.clone(),
                category_id: req.category_id,
                created_at: now,
            },
        )
        .ok_or_else(|| AppError::Conflict(DUPLICATE.to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::products::upsert(pool, &record).await {
            state.products.remove(record.id);
            return Err(db::persist_failed("products", e));
        }
    }

    tracing::info!(sku = %record.sku, by = %caller.username(), "product created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /products: List products, newest first, optionally filtered.
#[utoipa::path(
    get,
    path = "/products",
    params(ProductFilter),
    responses((status = 200, description = "Matching products", body = Vec<ProductRecord>)),
    security(("bearer" = [])),
    tag = "products"
)]
async fn list_products(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
    filter: Result<Query<ProductFilter>, QueryRejection>,
) -> Result<Json<Vec<ProductRecord>>, AppError> {
    let filter = extract_query(filter)?;
    let products = state
        .products
        .list()
        .into_iter()
        .rev()
        .filter(|p| filter.q.as_deref().map_or(true, |q| matches(p, q)))
        .collect();
    Ok(Json(products))
}

/// GET /products/:id
#[utoipa::path(
    get,
    path = "/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product found", body = ProductRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
async fn get_product(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
    Path(id): Path<i64>,
) -> Result<Json<ProductRecord>, AppError> {
    state
        .products
        .get(id)
        .map(Json)
        .ok_or_else(AppError::not_found)
}

/// PATCH /products/:id: Partial update.
#[utoipa::path(
    patch,
    path = "/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductRecord),
        (status = 400, description = "Category does not exist", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "SKU already exists", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
async fn update_product(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<ProductRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let _categories = state.categories.lock_writes().await;
    let _writes = state.products.lock_writes().await;
    if let Some(category_id) = req.category_id {
        if !state.categories.contains(category_id) {
            return Err(AppError::BadRequest(MISSING_CATEGORY.to_string()));
        }
    }

    let (before, updated) = state.products.with_write(|products, _| {
        if let Some(sku) = &req.sku {
            if products.values().any(|p| p.id != id && &p.sku == sku) {
                return Err(AppError::Conflict(DUPLICATE.to_string()));
            }
        }
        let product = products.get_mut(&id).ok_or_else(AppError::not_found)?;
        let before = product.clone();
        if let Some(sku) = req.sku {
            product.sku = sku;
        }
        if let Some(name) = req.name {
            product.name = name;
        }
        if let Some(description) = req.description {
            product.description = Some(description);
        }
        if req.category_id.is_some() {
            product.category_id = req.category_id;
        }
        Ok((before, product.clone()))
    })?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::products::upsert(pool, &updated).await {
            state.products.insert(id, before);
            return Err(db::persist_failed("products", e));
        }
    }

    Ok(Json(updated))
}

/// DELETE /products/:id: Remove a product with its stock and cost history.
#[utoipa::path(
    delete,
    path = "/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
async fn delete_product(
    State(state): State<AppState>,
    caller: Authenticated<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let _writes = state.products.lock_writes().await;
    let _inventory = state.inventory.lock_writes().await;
    let _costs = state.costs.lock_writes().await;
    if !state.products.contains(id) {
        return Err(AppError::not_found());
    }
    if let Some(pool) = &state.db_pool {
        db::products::delete(pool, id)
            .await
            .map_err(|e| db::persist_failed("products", e))?;
    }

    let removed = state.products.remove(id).ok_or_else(AppError::not_found)?;
    state
        .inventory
        .with_write(|rows, _| rows.retain(|_, row| row.product_id != id));
    state
        .costs
        .with_write(|rows, _| rows.retain(|_, row| row.product_id != id));

    tracing::info!(sku = %removed.sku, by = %caller.username(), "product deleted");
    Ok(Json(MessageResponse::deleted()))
}
