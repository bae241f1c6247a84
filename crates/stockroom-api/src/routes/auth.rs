//! # Authentication Endpoints
//!
//! - `POST /auth/login`: form `username`, `password` → bearer token
//! - `POST /auth/seed-admin`: first-run admin bootstrap
//! - `GET /auth/me`: the authenticated caller's profile
//!
//! Login never reveals whether the username exists, the password was wrong
//! or the account is inactive: all three are the same 400.

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use stockroom_auth::AccessToken;
use stockroom_core::Role;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Anyone, Authenticated};
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_form, extract_query};
use crate::routes::users::{validate_email, validate_password, validate_username};
use crate::routes::MessageResponse;
use crate::state::{AppState, UserRecord};

const BAD_LOGIN: &str = "Incorrect username or password";

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
}

impl From<AccessToken> for TokenResponse {
    fn from(token: AccessToken) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SeedAdminParams {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub username: String,
    pub email: String,
    #[schema(value_type = String)]
    pub role: Role,
    pub is_active: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/seed-admin", post(seed_admin))
        .route("/auth/me", get(me))
}

/// POST /auth/login: Exchange username and password for a token.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Incorrect username or password", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let form = extract_form(form)?;
    let user = state.users.find(|u| u.username == form.username);

    let credentials = state.credentials.clone();
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let password = form.password;
    let password_ok = tokio::task::spawn_blocking(move || {
        credentials.verify_login(&password, stored_hash.as_deref())
    })
    .await
    .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?;

    match user {
        Some(user) if password_ok && user.is_active => {
            let token = state
                .credentials
                .issue_token(&user.username)
                .map_err(|e| AppError::Internal(format!("token issuance failed: {e}")))?;
            tracing::info!(username = %user.username, "user logged in");
            Ok(Json(token.into()))
        }
        _ => {
            tracing::warn!(username = %form.username, "failed login");
            Err(AppError::BadRequest(BAD_LOGIN.to_string()))
        }
    }
}

/// POST /auth/seed-admin: Create the first admin account.
///
/// Only effective while no admin exists; afterwards it answers
/// `{"message": "Admin exists"}` and changes nothing.
#[utoipa::path(
    post,
    path = "/auth/seed-admin",
    params(SeedAdminParams),
    responses(
        (status = 200, description = "Admin created or already present", body = MessageResponse),
        (status = 409, description = "Username or email taken by a non-admin", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid parameters", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn seed_admin(
    State(state): State<AppState>,
    params: Result<Query<SeedAdminParams>, QueryRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let params = extract_query(params)?;
    if state.users.any(|u| u.role == Role::Admin) {
        return Ok(Json(MessageResponse::new("Admin exists")));
    }
    validate_username(&params.username).map_err(AppError::Validation)?;
    validate_email(&params.email).map_err(AppError::Validation)?;
    validate_password(&params.password).map_err(AppError::Validation)?;

    let credentials = state.credentials.clone();
    let password = params.password;
    let password_hash = tokio::task::spawn_blocking(move || credentials.hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let _writes = state.users.lock_writes().await;
    let now = state.now();
    let inserted = state.users.try_insert(
        |u| u.role == Role::Admin || u.username == params.username || u.email == params.email,
        |id| UserRecord {
            id,
            username: params.username.clone(),
            email: params.email.clone(),
            password_hash,
            role: Role::Admin,
            is_active: true,
            created_at: now,
        },
    );

    let Some(record) = inserted else {
        if state.users.any(|u| u.role == Role::Admin) {
            return Ok(Json(MessageResponse::new("Admin exists")));
        }
        return Err(AppError::Conflict("Username or email already exists".to_string()));
    };

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::users::upsert(pool, &record).await {
            state.users.remove(record.id);
            return Err(db::persist_failed("users", e));
        }
    }

    tracing::info!(username = %record.username, "seeded admin");
    Ok(Json(MessageResponse::new("Admin created")))
}

/// GET /auth/me: Profile of the authenticated caller.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Caller profile", body = MeResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
async fn me(
    State(state): State<AppState>,
    caller: Authenticated<Anyone>,
) -> Result<Json<MeResponse>, AppError> {
    let user = state
        .users
        .find(|u| u.username == caller.username())
        .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".to_string()))?;
    Ok(Json(MeResponse {
        username: user.username,
        email: user.email,
        role: user.role,
        is_active: user.is_active,
    }))
}
