//! Router setup and server startup.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use prism_core::error::{PrismError, Result};

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/graph/create", post(handlers::create_graph))
        .route("/graph/search", post(handlers::search_graph))
        .route("/graph/add-photo", post(handlers::add_photo))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the given port, bound to localhost.
pub async fn start_server(port: u16, state: AppState) -> Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PrismError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| PrismError::Storage(format!("Server error: {}", e)))?;

    Ok(())
}
