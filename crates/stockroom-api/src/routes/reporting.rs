//! # Stock Reports
//!
//! Aggregates over the inventory table. Only products with at least one
//! stock row appear; a product with rows summing to zero does.

use std::collections::BTreeMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Authenticated, Readers};
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::{AppState, InventoryRecord, ProductRecord};

pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StockSummary {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub total_quantity: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LowStockParams {
    /// Inclusive upper bound on total quantity. Defaults to 5.
    pub threshold: Option<i64>,
}

/// Total quantity per product, in product id order. Totals saturate at
/// `i64::MAX`.
pub fn summarize(products: &[ProductRecord], inventory: &[InventoryRecord]) -> Vec<StockSummary> {
    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for row in inventory {
        let total = totals.entry(row.product_id).or_default();
        *total = total.saturating_add(row.quantity);
    }
    products
        .iter()
        .filter_map(|p| {
            totals.get(&p.id).map(|total| StockSummary {
                product_id: p.id,
                sku: p.sku.clone(),
                name: p.name.clone(),
                total_quantity: *total,
            })
        })
        .collect()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reporting/stock-summary", get(stock_summary))
        .route("/reporting/low-stock", get(low_stock))
}

/// GET /reporting/stock-summary: Total stock per product.
#[utoipa::path(
    get,
    path = "/reporting/stock-summary",
    responses((status = 200, description = "Per-product totals", body = Vec<StockSummary>)),
    security(("bearer" = [])),
    tag = "reporting"
)]
async fn stock_summary(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
) -> Json<Vec<StockSummary>> {
    Json(summarize(&state.products.list(), &state.inventory.list()))
}

/// GET /reporting/low-stock: Products at or below the threshold.
#[utoipa::path(
    get,
    path = "/reporting/low-stock",
    params(LowStockParams),
    responses((status = 200, description = "Products with low stock", body = Vec<StockSummary>)),
    security(("bearer" = [])),
    tag = "reporting"
)]
async fn low_stock(
    State(state): State<AppState>,
    _caller: Authenticated<Readers>,
    params: Result<Query<LowStockParams>, QueryRejection>,
) -> Result<Json<Vec<StockSummary>>, AppError> {
    let threshold = extract_query(params)?
        .threshold
        .unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let low = summarize(&state.products.list(), &state.inventory.list())
        .into_iter()
        .filter(|s| s.total_quantity <= threshold)
        .collect();
    Ok(Json(low))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::{Clock, ManualClock};

    fn product(id: i64) -> ProductRecord {
        ProductRecord {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            description: None,
            category_id: None,
            created_at: ManualClock::at_epoch().now(),
        }
    }

    fn row(id: i64, product_id: i64, location_id: i64, quantity: i64) -> InventoryRecord {
        InventoryRecord {
            id,
            product_id,
            location_id,
            quantity,
            created_at: ManualClock::at_epoch().now(),
        }
    }

    #[test]
    fn sums_across_locations_and_skips_unstocked_products() {
        let products = vec![product(1), product(2), product(3)];
        let inventory = vec![row(1, 1, 10, 4), row(2, 1, 20, 3), row(3, 3, 10, 0)];
        let summary = summarize(&products, &inventory);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].product_id, 1);
        assert_eq!(summary[0].total_quantity, 7);
        assert_eq!(summary[1].product_id, 3);
        assert_eq!(summary[1].total_quantity, 0);
    }

    #[test]
    fn totals_saturate_instead_of_wrapping() {
        let inventory = vec![row(1, 1, 10, i64::MAX), row(2, 1, 20, 1)];
        let summary = summarize(&[product(1)], &inventory);
        assert_eq!(summary[0].total_quantity, i64::MAX);
        assert!(summary[0].total_quantity > DEFAULT_LOW_STOCK_THRESHOLD);
    }

    #[test]
    fn rows_for_deleted_products_are_ignored() {
        let summary = summarize(&[product(1)], &[row(1, 9, 10, 50)]);
        assert!(summary.is_empty());
    }
}
