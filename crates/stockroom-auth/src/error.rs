//! # Error Types
//!
//! One enum per stage of the guard chain. Only [`AuthError`] crosses the
//! boundary into the HTTP layer; the others stay internal detail that is
//! logged, never returned to a caller.

use stockroom_core::Role;
use thiserror::Error;

/// Token validation or issuance failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The signature does not match the configured key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The token is not a well-formed JWT or its claims do not decode.
    #[error("token is malformed: {0}")]
    Malformed(String),

    /// `now` has reached the token's expiry.
    #[error("token has expired")]
    Expired,

    /// The `sub` claim is empty.
    #[error("token has no subject")]
    MissingSubject,

    /// Signing failed while issuing a token.
    #[error("token encoding failed: {0}")]
    Encoding(String),

    /// Only HMAC algorithms can be used with a shared secret.
    #[error("unsupported signing algorithm '{0}': expected HS256, HS384 or HS512")]
    UnsupportedAlgorithm(String),

    /// Token lifetime must be a positive number of minutes.
    #[error("token ttl must be positive, got {0} minutes")]
    InvalidTtl(i64),
}

/// Password hashing failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// bcrypt cost outside `4..=31`.
    #[error("bcrypt cost must be between 4 and 31, got {0}")]
    InvalidCost(u32),

    /// The underlying hash computation failed.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Failure to look up an identity by token subject.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No identity is registered under the subject.
    #[error("identity '{0}' not found")]
    NotFound(String),

    /// The backing directory could not answer.
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of the authentication/authorization guard chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, invalid or expired token, unknown subject, or inactive account.
    #[error("could not validate credentials")]
    Unauthorized,

    /// Authenticated, but the role is not in the endpoint's allowed set.
    #[error("insufficient permissions: role '{role}' not in {allowed:?}")]
    Forbidden { role: Role, allowed: Vec<Role> },

    /// Identity lookup failed for reasons unrelated to the caller.
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}
