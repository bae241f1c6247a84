//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps authentication, validation and persistence failures to HTTP status
//! codes with a JSON body `{"error": {"code", "message", "details?"}}`.
//! Internal error details are never returned to clients.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use stockroom_auth::AuthError;
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "RATE_LIMITED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Structured extras. Rate-limit responses carry `retry_after_secs`;
    /// every other error omits the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request could not be parsed or violates a business precondition (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, invalid or expired token, or unknown/inactive identity (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but the role is not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness constraint violated (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Client exhausted its request window (429).
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// An outbound call failed (502).
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::BadGateway(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// The message shown to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::NotFound(m)
            | Self::Validation(m)
            | Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::BadGateway(m) => m.clone(),
            Self::RateLimited { .. } => "Rate limit exceeded".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound("Not found".to_string())
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.client_message(),
                details: self.details(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        match &self {
            Self::Unauthorized(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Self::RateLimited { retry_after_secs } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            _ => {}
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => Self::Unauthorized("Could not validate credentials".into()),
            AuthError::Forbidden { .. } => Self::Forbidden("Insufficient permissions".into()),
            AuthError::Unavailable(msg) => Self::Internal(format!("identity lookup failed: {msg}")),
        }
    }
}

impl From<stockroom_core::ValidationError> for AppError {
    fn from(err: stockroom_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use stockroom_core::Role;

    #[test]
    fn status_codes_and_error_codes() {
        let cases = [
            (AppError::NotFound("x".into()), 404, "NOT_FOUND"),
            (AppError::Validation("x".into()), 422, "VALIDATION_ERROR"),
            (AppError::BadRequest("x".into()), 400, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), 401, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), 403, "FORBIDDEN"),
            (AppError::Conflict("x".into()), 409, "CONFLICT"),
            (
                AppError::RateLimited {
                    retry_after_secs: 3,
                },
                429,
                "RATE_LIMITED",
            ),
            (AppError::BadGateway("x".into()), 502, "BAD_GATEWAY"),
            (AppError::Internal("x".into()), 500, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            let (actual, actual_code) = err.status_and_code();
            assert_eq!((actual.as_u16(), actual_code), (status, code), "{err}");
        }
    }

    #[tokio::test]
    async fn into_response_produces_json_body() {
        let response = AppError::NotFound("Not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "NOT_FOUND");
        assert_eq!(body.error.message, "Not found");
        assert!(body.error.details.is_none());
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let err = AppError::Internal("pool timed out at 10.0.0.5".into());
        let response = err.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(!String::from_utf8_lossy(&bytes).contains("10.0.0.5"));
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = AppError::Unauthorized("no".into()).into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[tokio::test]
    async fn rate_limited_carries_retry_after() {
        let response = AppError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body.error.details,
            Some(serde_json::json!({ "retry_after_secs": 42 }))
        );
    }

    #[test]
    fn auth_errors_map_to_http_errors() {
        assert!(matches!(
            AppError::from(AuthError::Unauthorized),
            AppError::Unauthorized(ref m) if m == "Could not validate credentials"
        ));
        let forbidden = AuthError::Forbidden {
            role: Role::Viewer,
            allowed: vec![Role::Admin],
        };
        assert!(matches!(
            AppError::from(forbidden),
            AppError::Forbidden(ref m) if m == "Insufficient permissions"
        ));
        assert!(matches!(
            AppError::from(AuthError::Unavailable("db down".into())),
            AppError::Internal(_)
        ));
    }
}
