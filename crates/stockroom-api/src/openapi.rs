//! # OpenAPI Document
//!
//! Collects every utoipa-annotated handler into one OpenAPI 3 document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockroom Inventory API",
        description = "Products, categories, locations, stock levels, unit costs, reporting and webhooks, behind role-based bearer-token access."
    ),
    paths(
        crate::routes::health::root,
        crate::routes::health::health,
        crate::routes::health::metrics,
        crate::routes::health::config_view,
        crate::routes::auth::login,
        crate::routes::auth::seed_admin,
        crate::routes::auth::me,
        crate::routes::users::create_user,
        crate::routes::users::list_users,
        crate::routes::users::update_user,
        crate::routes::users::delete_user,
        crate::routes::categories::create_category,
        crate::routes::categories::list_categories,
        crate::routes::categories::get_category,
        crate::routes::categories::update_category,
        crate::routes::categories::delete_category,
        crate::routes::locations::create_location,
        crate::routes::locations::list_locations,
        crate::routes::locations::get_location,
        crate::routes::locations::update_location,
        crate::routes::locations::delete_location,
        crate::routes::products::create_product,
        crate::routes::products::list_products,
        crate::routes::products::get_product,
        crate::routes::products::update_product,
        crate::routes::products::delete_product,
        crate::routes::inventory::set_inventory,
        crate::routes::inventory::list_inventory,
        crate::routes::inventory::update_inventory,
        crate::routes::inventory::transfer,
        crate::routes::costs::create_cost,
        crate::routes::costs::list_costs,
        crate::routes::reporting::stock_summary,
        crate::routes::reporting::low_stock,
        crate::routes::webhooks::create_webhook,
        crate::routes::webhooks::list_webhooks,
        crate::routes::webhooks::update_webhook,
        crate::routes::webhooks::delete_webhook,
        crate::routes::webhooks::trigger_webhook,
    ),
    components(schemas(
        crate::state::UserRecord,
        crate::state::CategoryRecord,
        crate::state::LocationRecord,
        crate::state::ProductRecord,
        crate::state::InventoryRecord,
        crate::state::CostRecord,
        crate::state::WebhookRecord,
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::middleware::metrics::MetricsSnapshot,
        crate::routes::MessageResponse,
        crate::routes::health::ServiceInfo,
        crate::routes::health::HealthStatus,
        crate::routes::health::ConfigView,
        crate::routes::auth::LoginForm,
        crate::routes::auth::TokenResponse,
        crate::routes::auth::MeResponse,
        crate::routes::users::CreateUserRequest,
        crate::routes::users::UpdateUserRequest,
        crate::routes::categories::CreateCategoryRequest,
        crate::routes::categories::UpdateCategoryRequest,
        crate::routes::locations::CreateLocationRequest,
        crate::routes::locations::UpdateLocationRequest,
        crate::routes::products::CreateProductRequest,
        crate::routes::products::UpdateProductRequest,
        crate::routes::inventory::SetInventoryRequest,
        crate::routes::inventory::UpdateInventoryRequest,
        crate::routes::costs::CreateCostRequest,
        crate::routes::reporting::StockSummary,
        crate::routes::webhooks::CreateWebhookRequest,
        crate::routes::webhooks::UpdateWebhookRequest,
        crate::routes::webhooks::TriggerResult,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health checks and service introspection"),
        (name = "auth", description = "Login, bootstrap and caller profile"),
        (name = "users", description = "Account administration"),
        (name = "categories", description = "Product categories"),
        (name = "locations", description = "Stock locations"),
        (name = "products", description = "Product catalogue"),
        (name = "inventory", description = "Stock levels and transfers"),
        (name = "costs", description = "Unit cost history"),
        (name = "reporting", description = "Stock reports"),
        (name = "webhooks", description = "Outbound event notifications"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` JWT scheme referenced by protected operations.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/users/{id}",
            "/products",
            "/inventory/transfer",
            "/reporting/low-stock",
            "/webhooks/{id}/trigger",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
