//! # Identity Resolution
//!
//! Turns a presented bearer token into an active [`Identity`]. The user
//! directory is abstracted behind [`IdentityResolver`] so the HTTP crate can
//! plug in its store and tests can plug in a map.
//!
//! Four causes produce an anonymous/unauthorized outcome: an invalid token,
//! an unknown subject, an inactive account, and no token at all. A directory
//! failure is *not* one of them; it propagates as
//! [`AuthError::Unavailable`].

use std::sync::Arc;

use stockroom_core::Identity;

use crate::error::{AuthError, ResolveError};
use crate::token::TokenIssuer;

/// Lookup of identities by token subject.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, subject: &str) -> Result<Identity, ResolveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    InvalidToken,
    UnknownSubject,
    Inactive,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::UnknownSubject => "unknown_subject",
            Self::Inactive => "inactive",
        }
    }
}

/// Token validator plus identity lookup.
#[derive(Clone)]
pub struct Authenticator {
    tokens: Arc<TokenIssuer>,
    resolver: Arc<dyn IdentityResolver>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenIssuer>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { tokens, resolver }
    }

    fn resolve(&self, token: &str) -> Result<Result<Identity, Rejection>, AuthError> {
        let subject = match self.tokens.validate(token) {
            Ok(sub) => sub,
            Err(e) => {
                tracing::debug!(error = %e, "token validation failed");
                return Ok(Err(Rejection::InvalidToken));
            }
        };
        match self.resolver.resolve(&subject) {
            Ok(identity) if identity.active => Ok(Ok(identity)),
            Ok(_) => Ok(Err(Rejection::Inactive)),
            Err(ResolveError::NotFound(_)) => Ok(Err(Rejection::UnknownSubject)),
            Err(ResolveError::Unavailable(msg)) => Err(AuthError::Unavailable(msg)),
        }
    }

    /// Resolve a token to an active identity, or fail with
    /// [`AuthError::Unauthorized`].
    pub fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        match self.resolve(token)? {
            Ok(identity) => Ok(identity),
            Err(rejection) => {
                tracing::warn!(reason = rejection.as_str(), "authentication rejected");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Like [`authenticate`](Self::authenticate), but the explicit
    /// rejection causes (and an absent token) yield `Ok(None)`.
    pub fn authenticate_optional(
        &self,
        token: Option<&str>,
    ) -> Result<Option<Identity>, AuthError> {
        let Some(token) = token else {
            return Ok(None);
        };
        match self.resolve(token)? {
            Ok(identity) => Ok(Some(identity)),
            Err(rejection) => {
                tracing::debug!(
                    reason = rejection.as_str(),
                    "optional authentication fell back to anonymous"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Duration;
    use jsonwebtoken::Algorithm;
    use stockroom_core::{ManualClock, Role};

    use crate::token::TokenSettings;

    struct MapDirectory(HashMap<String, Identity>);

    impl IdentityResolver for MapDirectory {
        fn resolve(&self, subject: &str) -> Result<Identity, ResolveError> {
            self.0
                .get(subject)
                .cloned()
                .ok_or_else(|| ResolveError::NotFound(subject.to_string()))
        }
    }

    struct Offline;

    impl IdentityResolver for Offline {
        fn resolve(&self, _: &str) -> Result<Identity, ResolveError> {
            Err(ResolveError::Unavailable("connection refused".into()))
        }
    }

    fn setup(
        resolver: Arc<dyn IdentityResolver>,
    ) -> (ManualClock, Arc<TokenIssuer>, Authenticator) {
        let clock = ManualClock::at_epoch();
        let settings = TokenSettings::new("k", Algorithm::HS256, 60);
        let tokens = Arc::new(TokenIssuer::new(&settings, clock.shared()).unwrap());
        let auth = Authenticator::new(tokens.clone(), resolver);
        (clock, tokens, auth)
    }

    fn directory() -> Arc<dyn IdentityResolver> {
        let mut map = HashMap::new();
        map.insert("alice".into(), Identity::new("alice", Role::Manager, true));
        map.insert("ghost".into(), Identity::new("ghost", Role::Admin, false));
        Arc::new(MapDirectory(map))
    }

    #[test]
    fn active_user_authenticates() {
        let (_, tokens, auth) = setup(directory());
        let token = tokens.issue("alice").unwrap().access_token;
        let id = auth.authenticate(&token).unwrap();
        assert_eq!(id.username, "alice");
        assert_eq!(id.role, Role::Manager);
    }

    #[test]
    fn inactive_user_is_unauthorized() {
        let (_, tokens, auth) = setup(directory());
        let token = tokens.issue("ghost").unwrap().access_token;
        assert_eq!(auth.authenticate(&token), Err(AuthError::Unauthorized));
    }

    #[test]
    fn unknown_subject_is_unauthorized() {
        let (_, tokens, auth) = setup(directory());
        let token = tokens.issue("nobody").unwrap().access_token;
        assert_eq!(auth.authenticate(&token), Err(AuthError::Unauthorized));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let (clock, tokens, auth) = setup(directory());
        let token = tokens.issue("alice").unwrap().access_token;
        clock.advance(Duration::minutes(60));
        assert_eq!(auth.authenticate(&token), Err(AuthError::Unauthorized));
    }

    #[test]
    fn optional_collapses_rejections_to_none() {
        let (_, tokens, auth) = setup(directory());
        assert_eq!(auth.authenticate_optional(None), Ok(None));
        assert_eq!(auth.authenticate_optional(Some("garbage")), Ok(None));
        let ghost = tokens.issue("ghost").unwrap().access_token;
        assert_eq!(auth.authenticate_optional(Some(&ghost)), Ok(None));
        let alice = tokens.issue("alice").unwrap().access_token;
        let resolved = auth.authenticate_optional(Some(&alice)).unwrap();
        assert_eq!(resolved.map(|i| i.username), Some("alice".to_string()));
    }

    #[test]
    fn directory_outage_is_not_anonymous() {
        let (_, tokens, auth) = setup(Arc::new(Offline));
        let token = tokens.issue("alice").unwrap().access_token;
        assert!(matches!(
            auth.authenticate_optional(Some(&token)),
            Err(AuthError::Unavailable(_))
        ));
        assert!(matches!(
            auth.authenticate(&token),
            Err(AuthError::Unavailable(_))
        ));
    }

    #[test]
    fn outage_is_not_consulted_for_bad_tokens() {
        let (_, _, auth) = setup(Arc::new(Offline));
        assert_eq!(auth.authenticate("garbage"), Err(AuthError::Unauthorized));
    }
}
