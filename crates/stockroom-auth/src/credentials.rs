//! # Credential Verifier
//!
//! Password hashing plus token issuance behind one handle. Login checks run
//! a full bcrypt comparison even when the username is unknown, against a
//! decoy hash computed at startup, so response time does not reveal which
//! usernames exist.

use std::sync::Arc;

use crate::error::{CredentialError, TokenError};
use crate::password::PasswordHasher;
use crate::token::{AccessToken, TokenIssuer};

#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    passwords: PasswordHasher,
    tokens: Arc<TokenIssuer>,
    decoy_hash: Arc<str>,
}

impl CredentialVerifier {
    pub fn new(
        passwords: PasswordHasher,
        tokens: Arc<TokenIssuer>,
    ) -> Result<Self, CredentialError> {
        let decoy_hash = passwords.hash("stockroom-decoy-password")?;
        Ok(Self {
            passwords,
            tokens,
            decoy_hash: decoy_hash.into(),
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        self.passwords.hash(password)
    }

    /// Check a login attempt. `stored_hash` is `None` when the username is
    /// unknown; the result is then always `false`, after the same amount of
    /// work as a real comparison.
    pub fn verify_login(&self, password: &str, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(hash) => self.passwords.verify(password, hash),
            None => {
                let _ = self.passwords.verify(password, &self.decoy_hash);
                false
            }
        }
    }

    pub fn issue_token(&self, subject: &str) -> Result<AccessToken, TokenError> {
        self.tokens.issue(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenSettings;
    use jsonwebtoken::Algorithm;
    use stockroom_core::ManualClock;

    fn issuer() -> Arc<TokenIssuer> {
        let clock = ManualClock::at_epoch();
        let settings = TokenSettings::new("k", Algorithm::HS256, 60);
        Arc::new(TokenIssuer::new(&settings, clock.shared()).unwrap())
    }

    fn verifier_with(tokens: Arc<TokenIssuer>) -> CredentialVerifier {
        CredentialVerifier::new(PasswordHasher::new(4).unwrap(), tokens).unwrap()
    }

    fn verifier() -> CredentialVerifier {
        verifier_with(issuer())
    }

    #[test]
    fn login_succeeds_with_matching_password() {
        let v = verifier();
        let hash = v.hash_password("s3cret").unwrap();
        assert!(v.verify_login("s3cret", Some(&hash)));
        assert!(!v.verify_login("wrong", Some(&hash)));
    }

    #[test]
    fn unknown_user_never_succeeds() {
        let v = verifier();
        assert!(!v.verify_login("stockroom-decoy-password", None));
        assert!(!v.verify_login("", None));
    }

    #[test]
    fn issued_token_validates_to_subject() {
        let tokens = issuer();
        let v = verifier_with(tokens.clone());
        let token = v.issue_token("bob").unwrap();
        assert_eq!(tokens.validate(&token.access_token).unwrap(), "bob");
    }
}
