//! # Product Categories
//!
//! Category names are unique. Deleting a category leaves its products in
//! place with no category.

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
use crate::state::{AppState, CategoryRecord};

const DUPLICATE: &str = "Category exists";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

impl Validate for CreateCategoryRequest {
    fn validate(&self) -> Result<(), String> {
        check_required("name", &self.name, 100)?;
        if let Some(description) = &self.description {
            check_len("description", description, 500)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Validate for UpdateCategoryRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            check_required("name", name, 100)?;
        }
        if let Some(description) = &self.description {
            check_len("description", description, 500)?;
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category)
                .patch(update_category)
                .delete(delete_category),
        )
}

/// POST /categories: Create a category.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryRecord),
        (status = 409, description = "Category exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "categories"
)]
async fn create_category(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    body: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CategoryRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.categories.lock_writes().await;
    let now = state.now();
    let record = state
        .categories
        .try_insert(
            |c| c.name == req.name,
            |id| CategoryRecord {
                id,
                name: req.name.clone(),
                description: req.description.clone(),
                created_at: now,
            },
        )
        .ok_or_else(|| AppError::Conflict(DUPLICATE.to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::categories::upsert(pool, &record).await {
            state.categories.remove(record.id);
            return Err(db::persist_failed("categories", e));
        }
    }

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /categories: List categories, newest first.
#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "All categories", body = Vec<CategoryRecord>)),
    security(("bearer" = [])),
    tag = "categories"
)]
async fn list_categories(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
) -> Json<Vec<CategoryRecord>> {
    let mut categories = state.categories.list();
    categories.reverse();
    Json(categories)
}

/// GET /categories/:id: Fetch one category.
#[utoipa::path(
    get,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category found", body = CategoryRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "categories"
)]
async fn get_category(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
    Path(id): Path<i64>,
) -> Result<Json<CategoryRecord>, AppError> {
    state
        .categories
        .get(id)
        .map(Json)
        .ok_or_else(AppError::not_found)
}

/// PATCH /categories/:id: Rename or re-describe a category.
#[utoipa::path(
    patch,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = CategoryRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Category exists", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "categories"
)]
async fn update_category(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> Result<Json<CategoryRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let _writes = state.categories.lock_writes().await;
    let (before, updated) = state.categories.with_write(|categories, _| {
        if let Some(name) = &req.name {
            if categories.values().any(|c| c.id != id && &c.name == name) {
                return Err(AppError::Conflict(DUPLICATE.to_string()));
            }
        }
        let category = categories.get_mut(&id).ok_or_else(AppError::not_found)?;
        let before = category.clone();
        if let Some(name) = req.name {
            category.name = name;
        }
        if let Some(description) = req.description {
            category.description = Some(description);
        }
        Ok((before, category.clone()))
    })?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::categories::upsert(pool, &updated).await {
            state.categories.insert(id, before);
            return Err(db::persist_failed("categories", e));
        }
    }

    Ok(Json(updated))
}

/// DELETE /categories/:id: Delete a category.
///
/// Products in the category keep existing with `category_id` cleared.
#[utoipa::path(
    delete,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "categories"
)]
async fn delete_category(
    State(state): State<AppState>,
    _caller: Authenticated<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let _writes = state.categories.lock_writes().await;
    let _products = state.products.lock_writes().await;
    if !state.categories.contains(id) {
        return Err(AppError::not_found());
    }
    // The table cascade clears category_id, so the row goes first.
    if let Some(pool) = &state.db_pool {
        db::categories::delete(pool, id)
            .await
            .map_err(|e| db::persist_failed("categories", e))?;
    }

    state.categories.remove(id).ok_or_else(AppError::not_found)?;
    state.products.with_write(|products, _| {
        for product in products.values_mut() {
            if product.category_id == Some(id) {
                product.category_id = None;
            }
        }
    });

    Ok(Json(MessageResponse::deleted()))
}
