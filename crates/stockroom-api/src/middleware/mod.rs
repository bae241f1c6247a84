//! # HTTP Middleware
//!
//! Cross-cutting layers applied around every route. Per-endpoint role
//! policy is not here; it lives in the extractors of [`crate::auth`].

pub mod metrics;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing_layer;
