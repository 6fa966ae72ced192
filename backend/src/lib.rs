//! Stockroom backend
//!
//! Records supplier purchases against a product catalog, keeps the stock ledger in step
//! with product stock, and raises price alerts when a product's unit price moves.

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod store;
pub mod uploads;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use store::{MemoryStore, PgStore, Store};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub config: Arc<Config>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app<S: Store>(state: AppState<S>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let invoice_files = ServeDir::new(&state.config.uploads.dir);
    let body_limit = state.config.uploads.max_body_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check::<S>))
        .nest("/api/v1", routes::api_routes())
        .nest_service(uploads::PUBLIC_PREFIX, invoice_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Stockroom Purchasing API v1"
}
