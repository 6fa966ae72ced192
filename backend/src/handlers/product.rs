//! HTTP handlers for product catalog and supplier endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use shared::models::{
    NewProduct, Product, ProductChanges, StockMovement, Supplier, UpsertAction, UpsertOutcome,
    UpsertProductInput,
};

use crate::error::AppResult;
use crate::services::ProductService;
use crate::store::Store;
use crate::AppState;

/// List all products
pub async fn list_products<S: Store>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.store);
    let products = service.list_products().await?;
    Ok(Json(products))
}

/// Get a product by ID
pub async fn get_product<S: Store>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<i64>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.store);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Create a new product
pub async fn create_product<S: Store>(
    State(state): State<AppState<S>>,
    Json(input): Json<NewProduct>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let service = ProductService::new(state.store);
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Update a product
pub async fn update_product<S: Store>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<i64>,
    Json(changes): Json<ProductChanges>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.store);
    let product = service.update_product(product_id, changes).await?;
    Ok(Json(product))
}

/// Create or update a product by SKU
pub async fn upsert_product<S: Store>(
    State(state): State<AppState<S>>,
    Json(input): Json<UpsertProductInput>,
) -> AppResult<(StatusCode, Json<UpsertOutcome>)> {
    let service = ProductService::new(state.store);
    let outcome = service.upsert_product(input).await?;
    let status = match outcome.action {
        UpsertAction::Created => StatusCode::CREATED,
        UpsertAction::Updated => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Products due for reorder
pub async fn low_stock_products<S: Store>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.store);
    let products = service.low_stock_products().await?;
    Ok(Json(products))
}

/// Stock ledger of a product
pub async fn get_stock_movements<S: Store>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<i64>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let service = ProductService::new(state.store);
    let movements = service.stock_movements(product_id).await?;
    Ok(Json(movements))
}

/// List suppliers
pub async fn list_suppliers<S: Store>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<Vec<Supplier>>> {
    let service = ProductService::new(state.store);
    let suppliers = service.list_suppliers().await?;
    Ok(Json(suppliers))
}
