//! Application state shared across route handlers.

use std::sync::Arc;
use std::time::Instant;

use prism_core::status::StoreStatus;
use prism_fusion::AnswerOrchestrator;
use prism_graph::GraphStore;
use prism_ingest::IngestionPipeline;
use prism_vector::VectorStore;

/// Shared application state, passed to handlers via axum's State extractor.
///
/// Everything is behind `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub orchestrator: Arc<AnswerOrchestrator>,
    /// Store handles for the health endpoint.
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub status: Arc<StoreStatus>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        orchestrator: Arc<AnswerOrchestrator>,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        status: Arc<StoreStatus>,
    ) -> Self {
        Self {
            pipeline,
            orchestrator,
            graph,
            vectors,
            status,
            start_time: Instant::now(),
        }
    }
}
