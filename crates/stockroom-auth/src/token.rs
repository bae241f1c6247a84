//! # Access Tokens
//!
//! Signed JWTs carrying `{sub, exp, iat}`. Only HMAC algorithms are
//! supported; the secret is shared between issuer and validator.
//!
//! ## Expiry
//!
//! Expiry is checked here against the injected [`Clock`] rather than by
//! `jsonwebtoken`, whose check reads the system time and applies leeway.
//! A token is valid while `now < exp`; at `now == exp` it is expired.
//!
//! [`Clock`]: stockroom_core::Clock

use std::fmt;

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use stockroom_core::SharedClock;
use zeroize::Zeroizing;

use crate::error::TokenError;

/// Parse an algorithm name. Accepts `HS256`, `HS384` and `HS512`,
/// case-insensitively.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(TokenError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Signing configuration.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Zeroizing<String>,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>, algorithm: Algorithm, ttl_minutes: i64) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            algorithm,
            ttl_minutes,
        }
    }
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the token holder.
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issue time, seconds since the Unix epoch.
    #[serde(default)]
    pub iat: i64,
}

/// Response body of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

impl AccessToken {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Issues and validates signed access tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
    validation: Validation,
    ttl: Duration,
    clock: SharedClock,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.header.alg)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(settings: &TokenSettings, clock: SharedClock) -> Result<Self, TokenError> {
        if settings.ttl_minutes <= 0 {
            return Err(TokenError::InvalidTtl(settings.ttl_minutes));
        }
        if !matches!(
            settings.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::UnsupportedAlgorithm(format!(
                "{:?}",
                settings.algorithm
            )));
        }

        let secret = settings.secret.as_bytes();
        let mut validation = Validation::new(settings.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            header: Header::new(settings.algorithm),
            validation,
            ttl: Duration::minutes(settings.ttl_minutes),
            clock,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `subject` expiring `ttl` from now.
    ///
    /// `exp` is whole seconds, rounded up, so a token never expires before
    /// `issued + ttl`.
    pub fn issue(&self, subject: &str) -> Result<AccessToken, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::MissingSubject);
        }
        let now = self.clock.now();
        let expires = now + self.ttl;
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires.timestamp() + i64::from(expires.timestamp_subsec_nanos() > 0),
            iat: now.timestamp(),
        };
        let token = jsonwebtoken::encode(&self.header, &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(AccessToken::bearer(token))
    }

    /// Verify signature and expiry, returning the subject.
    pub fn validate(&self, token: &str) -> Result<String, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                other => TokenError::Malformed(format!("{other:?}")),
            })?;

        let claims = data.claims;
        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.sub.is_empty() {
            return Err(TokenError::MissingSubject);
        }
        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::{Clock, ManualClock};

    fn issuer_with(secret: &str, alg: Algorithm, clock: &ManualClock) -> TokenIssuer {
        TokenIssuer::new(&TokenSettings::new(secret, alg, 60), clock.shared()).unwrap()
    }

    fn issuer(clock: &ManualClock) -> TokenIssuer {
        issuer_with("test-secret", Algorithm::HS256, clock)
    }

    #[test]
    fn issue_then_validate_returns_subject() {
        let clock = ManualClock::at_epoch();
        let tokens = issuer(&clock);
        let token = tokens.issue("alice").unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(tokens.validate(&token.access_token).unwrap(), "alice");
    }

    #[test]
    fn valid_one_second_before_expiry() {
        let clock = ManualClock::at_epoch();
        let tokens = issuer(&clock);
        let token = tokens.issue("alice").unwrap();
        clock.advance(Duration::minutes(60) - Duration::seconds(1));
        assert_eq!(tokens.validate(&token.access_token).unwrap(), "alice");
    }

    #[test]
    fn expired_exactly_at_ttl() {
        let clock = ManualClock::at_epoch();
        let tokens = issuer(&clock);
        let token = tokens.issue("alice").unwrap();
        clock.advance(Duration::minutes(60));
        assert_eq!(
            tokens.validate(&token.access_token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn sub_second_issue_never_expires_early() {
        let clock = ManualClock::at_epoch();
        clock.advance(Duration::milliseconds(900));
        let tokens = issuer(&clock);
        let token = tokens.issue("alice").unwrap();

        clock.advance(Duration::minutes(60) - Duration::milliseconds(1));
        assert_eq!(tokens.validate(&token.access_token).unwrap(), "alice");

        clock.advance(Duration::milliseconds(101));
        assert_eq!(
            tokens.validate(&token.access_token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let clock = ManualClock::at_epoch();
        let token = issuer_with("secret-a", Algorithm::HS256, &clock)
            .issue("alice")
            .unwrap();
        let other = issuer_with("secret-b", Algorithm::HS256, &clock);
        assert_eq!(
            other.validate(&token.access_token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let clock = ManualClock::at_epoch();
        let tokens = issuer(&clock);
        let token = tokens.issue("alice").unwrap().access_token;
        let forged = tokens.issue("mallory").unwrap().access_token;

        // Splice mallory's payload onto alice's signature.
        let a: Vec<&str> = token.split('.').collect();
        let m: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", a[0], m[1], a[2]);
        assert!(tokens.validate(&spliced).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let clock = ManualClock::at_epoch();
        let tokens = issuer(&clock);
        assert!(matches!(
            tokens.validate("not-a-jwt"),
            Err(TokenError::Malformed(_))
        ));
        assert!(tokens.validate("").is_err());
    }

    #[test]
    fn algorithm_mismatch_is_rejected() {
        let clock = ManualClock::at_epoch();
        let token = issuer_with("shared", Algorithm::HS512, &clock)
            .issue("alice")
            .unwrap();
        let hs256 = issuer_with("shared", Algorithm::HS256, &clock);
        assert!(hs256.validate(&token.access_token).is_err());
    }

    #[test]
    fn empty_subject_cannot_be_issued() {
        let clock = ManualClock::at_epoch();
        assert_eq!(issuer(&clock).issue(""), Err(TokenError::MissingSubject));
    }

    #[test]
    fn parse_algorithm_accepts_hmac_only() {
        assert_eq!(parse_algorithm("HS256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm("hs384").unwrap(), Algorithm::HS384);
        assert_eq!(parse_algorithm(" HS512 ").unwrap(), Algorithm::HS512);
        assert!(matches!(
            parse_algorithm("RS256"),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
        assert!(parse_algorithm("none").is_err());
    }

    #[test]
    fn non_hmac_settings_are_rejected() {
        let clock = ManualClock::at_epoch();
        let err = TokenIssuer::new(
            &TokenSettings::new("s", Algorithm::RS256, 60),
            clock.shared(),
        )
        .unwrap_err();
        assert!(matches!(err, TokenError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let clock = ManualClock::at_epoch();
        let err = TokenIssuer::new(
            &TokenSettings::new("s", Algorithm::HS256, 0),
            clock.shared(),
        )
        .unwrap_err();
        assert_eq!(err, TokenError::InvalidTtl(0));
    }

    #[test]
    fn debug_never_prints_secret() {
        let settings = TokenSettings::new("super-secret-value", Algorithm::HS256, 60);
        let out = format!("{settings:?}");
        assert!(!out.contains("super-secret-value"));
        assert!(out.contains("REDACTED"));
    }

    #[test]
    fn claims_carry_issue_and_expiry_times() {
        let clock = ManualClock::at_epoch();
        let tokens = issuer(&clock);
        let token = tokens.issue("alice").unwrap().access_token;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = jsonwebtoken::decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims.iat, clock.now().timestamp());
        assert_eq!(data.claims.exp - data.claims.iat, 3600);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use stockroom_core::ManualClock;

    proptest! {
        #[test]
        fn any_subject_round_trips(subject in "[a-zA-Z0-9_.@-]{1,64}") {
            let clock = ManualClock::at_epoch();
            let tokens = TokenIssuer::new(
                &TokenSettings::new("prop-secret", Algorithm::HS256, 5),
                clock.shared(),
            ).unwrap();
            let token = tokens.issue(&subject).unwrap();
            prop_assert_eq!(tokens.validate(&token.access_token).unwrap(), subject);
        }

        #[test]
        fn validity_is_exactly_before_expiry(elapsed in 0i64..600) {
            let clock = ManualClock::at_epoch();
            let tokens = TokenIssuer::new(
                &TokenSettings::new("prop-secret", Algorithm::HS256, 5),
                clock.shared(),
            ).unwrap();
            let token = tokens.issue("alice").unwrap();
            clock.advance(Duration::seconds(elapsed));
            let result = tokens.validate(&token.access_token);
            if elapsed < 300 {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result, Err(TokenError::Expired));
            }
        }
    }
}
