//! # User Administration
//!
//! Admin-only account management. Passwords are bcrypt-hashed on a
//! blocking thread and never returned.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use stockroom_core::Role;
use utoipa::ToSchema;

use crate::auth::{AdminOnly, Authenticated};
use crate::db;
use crate::error::AppError;
use crate::extractors::{check_len, check_required, extract_validated_json, Validate};
use crate::routes::MessageResponse;
use crate::state::{AppState, UserRecord};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

pub fn validate_username(username: &str) -> Result<(), String> {
    check_required("username", username, 150)
}

pub fn validate_email(email: &str) -> Result<(), String> {
    check_required("email", email, 255)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err("email must be a valid address".to_string()),
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    check_len("password", password, MAX_PASSWORD_LEN)
}

fn parse_role(role: &str) -> Result<Role, String> {
    role.parse::<Role>().map_err(|e| e.to_string())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// `admin`, `manager` or `viewer`. Defaults to `manager`.
    pub role: Option<String>,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if let Some(role) = &self.role {
            parse_role(role)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(role) = &self.role {
            parse_role(role)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", patch(update_user).delete(delete_user))
}

async fn hash_password(state: &AppState, password: String) -> Result<String, AppError> {
    let credentials = state.credentials.clone();
    tokio::task::spawn_blocking(move || credentials.hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// POST /users: Create a user account.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserRecord),
        (status = 409, description = "Username or email already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
async fn create_user(
    State(state): State<AppState>,
    caller: Authenticated<AdminOnly>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let role = match &req.role {
        Some(role) => parse_role(role).map_err(AppError::Validation)?,
        None => Role::default(),
    };
    if state
        .users
        .any(|u| u.username == req.username || u.email == req.email)
    {
        return Err(AppError::Conflict("Username or email already exists".to_string()));
    }

    let password_hash = hash_password(&state, req.password).await?;
    let _writes = state.users.lock_writes().await;
    let now = state.now();
    let record = state
        .users
        .try_insert(
            |u| u.username == req.username || u.email == req.email,
            |id| UserRecord {
                id,
                username: req.username.clone(),
                email: req.email.clone(),
                password_hash,
                role,
                is_active: true,
                created_at: now,
            },
        )
        .ok_or_else(|| AppError::Conflict("Username or email already exists".to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::users::upsert(pool, &record).await {
            state.users.remove(record.id);
            return Err(db::persist_failed("users", e));
        }
    }

    tracing::info!(
        created = %record.username,
        role = %record.role,
        by = %caller.username(),
        "user created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /users: List all users.
#[utoipa::path(
    get,
    path = "/users",
    responses((status = 200, description = "All users", body = Vec<UserRecord>)),
    security(("bearer" = [])),
    tag = "users"
)]
async fn list_users(
    State(state): State<AppState>,
    _caller: Authenticated<AdminOnly>,
) -> Json<Vec<UserRecord>> {
    Json(state.users.list())
}

/// PATCH /users/:id: Change email, role, active flag or password.
#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserRecord),
        (status = 404, description = "User not found", body = crate::error::ErrorBody),
        (status = 409, description = "Email already in use", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
async fn update_user(
    State(state): State<AppState>,
    caller: Authenticated<AdminOnly>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserRecord>, AppError> {
    let req = extract_validated_json(body)?;
    if !state.users.contains(id) {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let role = req
        .role
        .as_deref()
        .map(parse_role)
        .transpose()
        .map_err(AppError::Validation)?;
    let password_hash = match req.password {
        Some(password) => Some(hash_password(&state, password).await?),
        None => None,
    };

    let _writes = state.users.lock_writes().await;
    let (before, updated) = state.users.with_write(|users, _| {
        if let Some(email) = &req.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::Conflict("Username or email already exists".to_string()));
            }
        }
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let before = user.clone();
        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(role) = role {
            user.role = role;
        }
        if let Some(active) = req.is_active {
            user.is_active = active;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        Ok((before, user.clone()))
    })?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::users::upsert(pool, &updated).await {
            state.users.insert(before.id, before);
            return Err(db::persist_failed("users", e));
        }
    }

    tracing::info!(
        user = %updated.username,
        role = %updated.role,
        active = updated.is_active,
        by = %caller.username(),
        "user updated"
    );
    Ok(Json(updated))
}

/// DELETE /users/:id: Delete a user account.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
async fn delete_user(
    State(state): State<AppState>,
    caller: Authenticated<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let _writes = state.users.lock_writes().await;
    let removed = state
        .users
        .remove(id)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::users::delete(pool, id).await {
            state.users.insert(removed.id, removed);
            return Err(db::persist_failed("users", e));
        }
    }

    tracing::info!(user = %removed.username, by = %caller.username(), "user deleted");
    Ok(Json(MessageResponse::deleted()))
}
