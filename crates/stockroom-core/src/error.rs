//! # Validation Errors
//!
//! Errors raised when parsing domain primitives from untrusted input.

use thiserror::Error;

/// Failure to construct a domain primitive from its string form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The role name is not one of `admin`, `manager`, `viewer`.
    #[error("unknown role '{0}': expected one of admin, manager, viewer")]
    UnknownRole(String),
}
