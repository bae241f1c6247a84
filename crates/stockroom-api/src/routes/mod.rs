//! # API Route Modules
//!
//! One module per resource. Each exposes `router() -> Router<AppState>`,
//! merged by [`crate::app`]. Role policy is declared on each handler via
//! the [`crate::auth`] extractors.

pub mod auth;
pub mod categories;
pub mod costs;
pub mod health;
pub mod inventory;
pub mod locations;
pub mod products;
pub mod reporting;
pub mod users;
pub mod webhooks;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plain acknowledgement body, e.g. `{"message": "deleted"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn deleted() -> Self {
        Self::new("deleted")
    }
}
