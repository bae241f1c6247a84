//! # Access Guard
//!
//! A declarative allowed-role set bound to an endpoint. Guards are built in
//! `const` context so each route can declare its policy as a constant.

use stockroom_core::{Identity, Role};

use crate::error::AuthError;

/// Admits an authenticated identity whose role is in `allowed`.
/// An empty set admits any authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGuard {
    allowed: &'static [Role],
}

/// Build a guard over a fixed role set.
pub const fn require_roles(allowed: &'static [Role]) -> AccessGuard {
    AccessGuard { allowed }
}

impl AccessGuard {
    pub fn allowed(&self) -> &'static [Role] {
        self.allowed
    }

    /// Pass the identity through when admitted, otherwise
    /// [`AuthError::Forbidden`].
    pub fn check(&self, identity: Identity) -> Result<Identity, AuthError> {
        if self.allowed.is_empty() || identity.has_any_role(self.allowed) {
            Ok(identity)
        } else {
            Err(AuthError::Forbidden {
                role: identity.role,
                allowed: self.allowed.to_vec(),
            })
        }
    }
}
