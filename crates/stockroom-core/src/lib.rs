//! # stockroom-core: Foundational Types for the Inventory Service
//!
//! Leaf crate of the workspace. Defines the vocabulary shared by the
//! authentication layer and the HTTP service:
//!
//! - [`Role`]: coarse permission label attached to every user.
//! - [`Identity`]: the resolved caller (username, role, active flag).
//! - [`Clock`]: injectable source of "now", with [`SystemClock`] for
//!   production and [`ManualClock`] for deterministic tests.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `stockroom-*` crates.
//! - No `.unwrap()` outside tests.

pub mod clock;
pub mod error;
pub mod identity;
pub mod role;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::ValidationError;
pub use identity::Identity;
pub use role::Role;
