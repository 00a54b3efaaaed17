//! Prism HTTP surface.
//!
//! Thin axum layer over the ingestion pipeline and answer orchestrator:
//! `/graph/create`, `/graph/search`, `/graph/add-photo`, and `/health`.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::{create_router, start_server};
pub use state::AppState;
