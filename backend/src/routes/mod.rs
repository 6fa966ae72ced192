//! API route definitions

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::store::Store;
use crate::AppState;

/// Create all API routes
pub fn api_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .nest("/purchases", purchase_routes())
        .nest("/products", product_routes())
        .route("/suppliers", get(handlers::list_suppliers::<S>))
        .route("/price-alerts", get(handlers::list_price_alerts::<S>))
}

/// Purchase recording routes
fn purchase_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchases::<S>).post(handlers::create_purchase::<S>),
        )
        .route("/:id", delete(handlers::delete_purchase::<S>))
}

/// Product catalog routes
fn product_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/",
            get(handlers::list_products::<S>).post(handlers::create_product::<S>),
        )
        .route("/upsert", post(handlers::upsert_product::<S>))
        .route("/low-stock", get(handlers::low_stock_products::<S>))
        .route(
            "/:id",
            get(handlers::get_product::<S>).put(handlers::update_product::<S>),
        )
        .route("/:id/movements", get(handlers::get_stock_movements::<S>))
}
