//! # Unit Costs
//!
//! Append-only cost history per product. Records are never edited; a new
//! cost is recorded instead.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Authenticated, Readers, Staff};
use crate::db;
use crate::error::AppError;
use crate::extractors::{check_required, extract_query, extract_validated_json, Validate};
use crate::state::{AppState, CostRecord};

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCostRequest {
    pub product_id: i64,
    #[schema(minimum = 0)]
    pub unit_cost: f64,
    /// ISO-style currency code, at most 8 characters. Defaults to `USD`.
    pub currency: Option<String>,
}

impl Validate for CreateCostRequest {
    fn validate(&self) -> Result<(), String> {
        if !self.unit_cost.is_finite() || self.unit_cost < 0.0 {
            return Err("unit_cost must be a non-negative number".to_string());
        }
        if let Some(currency) = &self.currency {
            check_required("currency", currency, 8)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CostFilter {
    pub product_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/costs", get(list_costs).post(create_cost))
}

/// POST /costs: Record a unit cost for a product.
#[utoipa::path(
    post,
    path = "/costs",
    request_body = CreateCostRequest,
    responses(
        (status = 201, description = "Cost recorded", body = CostRecord),
        (status = 400, description = "Invalid product", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "costs"
)]
async fn create_cost(
    State(state): State<AppState>,
    _caller: Authenticated<Staff>,
    body: Result<Json<CreateCostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CostRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let _products = state.products.lock_writes().await;
    let _writes = state.costs.lock_writes().await;
    if !state.products.contains(req.product_id) {
        return Err(AppError::BadRequest("Invalid product".to_string()));
    }

    let currency = req
        .currency
        .map(|c| c.trim().to_uppercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let now = state.now();
    let record = state
        .costs
        .try_insert(
            |_| false,
            |id| CostRecord {
                id,
                product_id: req.product_id,
                unit_cost: req.unit_cost,
                currency,
                effective_at: now,
            },
        )
        .ok_or_else(|| AppError::Internal("cost insert refused".to_string()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::costs::insert(pool, &record).await {
            state.costs.remove(record.id);
            return Err(db::persist_failed("costs", e));
        }
    }

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /costs: Cost history, newest first, optionally for one product.
#[utoipa::path(
    get,
    path = "/costs",
    params(CostFilter),
    responses((status = 200, description = "Cost records", body = Vec<CostRecord>)),
    security(("bearer" = [])),
    tag = "costs"
)]
async fn list_costs(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
    filter: Result<Query<CostFilter>, QueryRejection>,
) -> Result<Json<Vec<CostRecord>>, AppError> {
    let filter = extract_query(filter)?;
    let costs = state
        .costs
        .list()
        .into_iter()
        .rev()
        .filter(|c| filter.product_id.map_or(true, |id| c.product_id == id))
        .collect();
    Ok(Json(costs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(unit_cost: f64, currency: Option<&str>) -> CreateCostRequest {
        CreateCostRequest {
            product_id: 1,
            unit_cost,
            currency: currency.map(str::to_string),
        }
    }

    #[test]
    fn zero_cost_is_allowed() {
        assert!(request(0.0, None).validate().is_ok());
    }

    #[test]
    fn negative_or_non_finite_cost_is_rejected() {
        assert!(request(-0.01, None).validate().is_err());
        assert!(request(f64::NAN, None).validate().is_err());
        assert!(request(f64::INFINITY, None).validate().is_err());
    }

    #[test]
    fn currency_is_at_most_eight_characters() {
        assert!(request(1.0, Some("EUR")).validate().is_ok());
        assert!(request(1.0, Some("TOOLONGCC")).validate().is_err());
        assert!(request(1.0, Some(" ")).validate().is_err());
    }
}
