//! # Password Hashing
//!
//! bcrypt with a configurable work factor. Hashes embed their own salt and
//! cost, so a hash produced under one cost still verifies after the cost is
//! raised.
//!
//! bcrypt only considers the first 72 bytes of a password.

use crate::error::CredentialError;

/// bcrypt hasher with a fixed cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Lowest cost bcrypt accepts. Only suitable for tests.
    pub const MIN_COST: u32 = 4;
    /// Highest cost bcrypt accepts.
    pub const MAX_COST: u32 = 31;

    pub fn new(cost: u32) -> Result<Self, CredentialError> {
        if !(Self::MIN_COST..=Self::MAX_COST).contains(&cost) {
            return Err(CredentialError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Produce a salted, one-way hash of `password`.
    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Check `password` against a stored hash.
    ///
    /// Returns `false` for a mismatch and for a hash that does not parse;
    /// a corrupt stored hash is indistinguishable from a wrong password.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash could not be parsed");
                false
            }
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::new(PasswordHasher::MIN_COST).unwrap()
    }

    #[test]
    fn verify_accepts_own_hash() {
        let hasher = fast();
        for password in ["correct horse", "", "p@ss w0rd ✓", "x"] {
            let hash = hasher.hash(password).unwrap();
            assert!(hasher.verify(password, &hash), "password {password:?}");
        }
    }

    #[test]
    fn verify_rejects_other_password() {
        let hasher = fast();
        let hash = hasher.hash("hunter22").unwrap();
        assert!(!hasher.verify("hunter23", &hash));
        assert!(!hasher.verify("", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = fast();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("same-password", &a));
        assert!(hasher.verify("same-password", &b));
    }

    #[test]
    fn hash_never_contains_plaintext() {
        let hash = fast().hash("plaintext-secret").unwrap();
        assert!(!hash.contains("plaintext-secret"));
    }

    #[test]
    fn malformed_hash_is_a_mismatch_not_a_panic() {
        let hasher = fast();
        assert!(!hasher.verify("anything", "not-a-bcrypt-hash"));
        assert!(!hasher.verify("anything", ""));
        assert!(!hasher.verify("anything", "$2b$04$tooshort"));
    }

    #[test]
    fn hash_from_different_cost_still_verifies() {
        let low = fast();
        let higher = PasswordHasher::new(5).unwrap();
        let hash = low.hash("portable").unwrap();
        assert!(higher.verify("portable", &hash));
    }

    #[test]
    fn cost_bounds_are_enforced() {
        assert_eq!(PasswordHasher::new(3), Err(CredentialError::InvalidCost(3)));
        assert_eq!(PasswordHasher::new(32), Err(CredentialError::InvalidCost(32)));
        assert_eq!(PasswordHasher::new(10).unwrap().cost(), 10);
    }

    #[test]
    fn default_uses_bcrypt_default_cost() {
        assert_eq!(PasswordHasher::default().cost(), bcrypt::DEFAULT_COST);
    }
}
