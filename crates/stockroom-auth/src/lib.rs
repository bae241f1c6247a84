//! # stockroom-auth: Credentials, Tokens, Identity, and Access Guards
//!
//! The authentication core of the inventory service. Nothing in this crate
//! knows about HTTP; the API crate wires these pieces into its request
//! pipeline.
//!
//! ## Components
//!
//! | Component | Type | Responsibility |
//! |-----------|------|----------------|
//! | Credential Verifier | [`CredentialVerifier`] | bcrypt hash/verify, token issuance |
//! | Token codec | [`TokenIssuer`] | signed JWT `{sub, exp}` issue + validate |
//! | Identity Resolver | [`Authenticator`] over [`IdentityResolver`] | token → active [`Identity`] |
//! | Access Guard | [`AccessGuard`] / [`require_roles`] | role ∈ allowed set |
//!
//! ## Failure taxonomy
//!
//! Bad signature, malformed payload, expiry, unknown subject and inactive
//! account all collapse into [`AuthError::Unauthorized`]. Callers never learn
//! which one occurred. [`AuthError::Forbidden`] is only produced by a guard
//! after authentication succeeded. Directory outages surface as
//! [`AuthError::Unavailable`] and are never mistaken for an anonymous caller.
//!
//! [`Identity`]: stockroom_core::Identity

pub mod credentials;
pub mod error;
pub mod guard;
pub mod password;
pub mod resolver;
pub mod token;

pub use credentials::CredentialVerifier;
pub use error::{AuthError, CredentialError, ResolveError, TokenError};
pub use guard::{require_roles, AccessGuard};
pub use jsonwebtoken::Algorithm;
pub use password::PasswordHasher;
pub use resolver::{Authenticator, IdentityResolver};
pub use token::{parse_algorithm, AccessToken, Claims, TokenIssuer, TokenSettings};
