//! # Caller Identity
//!
//! The resolved view of a user account as seen by the guard chain. The
//! persistence layer owns the full user record; the identity resolver only
//! projects it down to this value.

use serde::{Deserialize, Serialize};

use crate::role::Role;

/// An authenticated (or authenticatable) caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Unique username; also the token subject.
    pub username: String,
    /// The caller's single role.
    pub role: Role,
    /// Inactive identities are treated as unknown by authentication.
    pub active: bool,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: Role, active: bool) -> Self {
        Self {
            username: username.into(),
            role,
            active,
        }
    }

    /// Whether the identity's role is one of `roles`.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_any_role_is_set_membership() {
        let viewer = Identity::new("vera", Role::Viewer, true);
        assert!(viewer.has_any_role(&[Role::Viewer]));
        assert!(viewer.has_any_role(&[Role::Admin, Role::Viewer]));
        assert!(!viewer.has_any_role(&[Role::Admin, Role::Manager]));
        assert!(!viewer.has_any_role(&[]));
    }
}
