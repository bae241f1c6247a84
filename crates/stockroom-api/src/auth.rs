//! # Authentication & Authorization Extractors
//!
//! Role policy is declared per handler through the extractor's type
//! parameter:
//!
//! ```ignore
//! async fn delete_product(_caller: Authenticated<AdminOnly>, ...) { ... }
//! ```
//!
//! [`Authenticated<P>`] reads the `Authorization: Bearer` header, resolves
//! the token to an active identity through the [`Authenticator`], then
//! applies `P`'s [`AccessGuard`]. Rejections are 401 (anything wrong with
//! the credential or the account) or 403 (role not allowed). The rate
//! limiter has already run by the time an extractor executes.
//!
//! [`MaybeAuthenticated`] is the optional variant: the same four causes of
//! rejection (no token, bad token, unknown subject, inactive) yield an
//! anonymous caller instead of an error.
//!
//! [`Authenticator`]: stockroom_auth::Authenticator

use std::marker::PhantomData;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use stockroom_auth::{require_roles, AccessGuard, AuthError};
use stockroom_core::{Identity, Role};

use crate::error::AppError;
use crate::state::AppState;

// ── Role policies ───────────────────────────────────────────────────────────

/// Static allowed-role set for an endpoint.
pub trait RolePolicy: Send + Sync + 'static {
    const GUARD: AccessGuard;
}

/// Any authenticated, active identity.
#[derive(Debug)]
pub struct Anyone;

/// admin, manager, viewer.
#[derive(Debug)]
pub struct Readers;

/// admin, manager.
#[derive(Debug)]
pub struct Staff;

#[derive(Debug)]
pub struct AdminOnly;

impl RolePolicy for Anyone {
    const GUARD: AccessGuard = require_roles(&[]);
}

impl RolePolicy for Readers {
    const GUARD: AccessGuard = require_roles(&[Role::Admin, Role::Manager, Role::Viewer]);
}

impl RolePolicy for Staff {
    const GUARD: AccessGuard = require_roles(&[Role::Admin, Role::Manager]);
}

impl RolePolicy for AdminOnly {
    const GUARD: AccessGuard = require_roles(&[Role::Admin]);
}

// ── Token extraction ────────────────────────────────────────────────────────

/// The bearer token from the `Authorization` header, if well-formed.
///
/// The scheme is matched case-insensitively. Any other scheme, or an
/// empty token, counts as no token.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// ── Extractors ──────────────────────────────────────────────────────────────

/// An authenticated caller admitted by policy `P`.
#[derive(Debug)]
pub struct Authenticated<P: RolePolicy> {
    pub identity: Identity,
    _policy: PhantomData<P>,
}

impl<P: RolePolicy> Authenticated<P> {
    pub fn username(&self) -> &str {
        &self.identity.username
    }
}

#[axum::async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for Authenticated<P> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();

        let Some(token) = bearer_token(parts) else {
            tracing::warn!(path = %path, "authentication failed: missing bearer token");
            return Err(AuthError::Unauthorized.into());
        };

        let identity = state.authenticator.authenticate(token)?;

        match P::GUARD.check(identity) {
            Ok(identity) => Ok(Self {
                identity,
                _policy: PhantomData,
            }),
            Err(err) => {
                if let AuthError::Forbidden { role, allowed } = &err {
                    tracing::warn!(path = %path, role = %role, allowed = ?allowed, "access denied");
                }
                Err(err.into())
            }
        }
    }
}

/// A caller that may be anonymous.
#[derive(Debug)]
pub struct MaybeAuthenticated(pub Option<Identity>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeAuthenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state
            .authenticator
            .authenticate_optional(bearer_token(parts))?;
        Ok(Self(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use chrono::Duration;
    use stockroom_core::ManualClock;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::state::UserRecord;

    fn state(clock: &ManualClock) -> AppState {
        let config = AppConfig {
            bcrypt_cost: 4,
            ..AppConfig::default()
        };
        AppState::with_clock(config, None, clock.shared()).unwrap()
    }

    fn add_user(state: &AppState, username: &str, role: Role, active: bool) -> String {
        let now = state.now();
        state
            .users
            .try_insert(
                |_| false,
                |id| UserRecord {
                    id,
                    username: username.to_string(),
                    email: format!("{username}@example.com"),
                    password_hash: String::new(),
                    role,
                    is_active: active,
                    created_at: now,
                },
            )
            .unwrap();
        state
            .credentials
            .issue_token(username)
            .unwrap()
            .access_token
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    async fn staff_only(caller: Authenticated<Staff>) -> String {
        caller.username().to_string()
    }

    async fn whoami(MaybeAuthenticated(caller): MaybeAuthenticated) -> String {
        caller
            .map(|c| c.username)
            .unwrap_or_else(|| "anonymous".into())
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/staff", get(staff_only))
            .route("/whoami", get(whoami))
            .with_state(state)
    }

    async fn call(app: &Router, uri: &str, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let resp = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .unwrap()
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn staff_endpoint_admits_manager() {
        let clock = ManualClock::at_epoch();
        let state = state(&clock);
        let token = add_user(&state, "mia", Role::Manager, true);
        let app = router(state);

        let (status, body) = call(&app, "/staff", Some(&bearer(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "mia");
    }

    #[tokio::test]
    async fn staff_endpoint_forbids_viewer() {
        let clock = ManualClock::at_epoch();
        let state = state(&clock);
        let token = add_user(&state, "vic", Role::Viewer, true);
        let app = router(state);

        let (status, body) = call(&app, "/staff", Some(&bearer(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("Insufficient permissions"));
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_401() {
        let clock = ManualClock::at_epoch();
        let app = router(state(&clock));
        for auth in [
            None,
            Some("Basic dXNlcjpwYXNz"),
            Some("Bearer "),
            Some("Bearer not.a.jwt"),
        ] {
            let (status, body) = call(&app, "/staff", auth).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{auth:?}");
            assert!(body.contains("Could not validate credentials"));
        }
    }

    #[tokio::test]
    async fn inactive_and_expired_are_401() {
        let clock = ManualClock::at_epoch();
        let state = state(&clock);
        let inactive = add_user(&state, "old", Role::Admin, false);
        let active = add_user(&state, "new", Role::Admin, true);
        let app = router(state);

        let (status, _) = call(&app, "/staff", Some(&bearer(&inactive))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        clock.advance(Duration::minutes(60));
        let (status, _) = call(&app, "/staff", Some(&bearer(&active))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn optional_auth_falls_back_to_anonymous() {
        let clock = ManualClock::at_epoch();
        let state = state(&clock);
        let token = add_user(&state, "ann", Role::Viewer, true);
        let lowercase = format!("bearer {token}");
        let app = router(state);

        assert_eq!(call(&app, "/whoami", None).await.1, "anonymous");
        assert_eq!(
            call(&app, "/whoami", Some("Bearer junk")).await.1,
            "anonymous"
        );
        assert_eq!(call(&app, "/whoami", Some(&lowercase)).await.1, "ann");
    }

    #[test]
    fn policies_hold_expected_roles() {
        assert!(Anyone::GUARD.allowed().is_empty());
        assert_eq!(Readers::GUARD.allowed().len(), 3);
        assert_eq!(Staff::GUARD.allowed(), &[Role::Admin, Role::Manager]);
        assert_eq!(AdminOnly::GUARD.allowed(), &[Role::Admin]);
    }
}
