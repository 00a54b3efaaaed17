//! Prism application binary - composition root.
//!
//! 1. Resolve configuration (CLI > env > TOML > defaults)
//! 2. Initialize tracing
//! 3. Open the graph store and vector index
//! 4. Wire the external capabilities (OpenAI-backed when a key is
//!    configured, offline deterministic implementations otherwise)
//! 5. Start the axum REST API server

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use prism_api::AppState;
use prism_core::config::PrismConfig;
use prism_core::schema::SchemaVocabulary;
use prism_core::status::StoreStatus;
use prism_fusion::{
    AnswerOrchestrator, AnswerRanker, FirstPhotoRanker, FusionOptions, OpenAiRanker,
};
use prism_graph::{GraphStore, SqliteGraphStore};
use prism_ingest::{GraphExtractor, IngestionPipeline, KeywordExtractor, OpenAiExtractor};
use prism_vector::{DynEmbeddingService, MemoryVectorStore, MockEmbedding, OpenAiEmbedding};

use cli::CliArgs;

/// Expand a leading ~ to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

fn open_graph_store(db_path: &str) -> prism_core::Result<SqliteGraphStore> {
    if db_path == ":memory:" {
        SqliteGraphStore::in_memory()
    } else {
        SqliteGraphStore::new(&expand_home(db_path))
    }
}

#[tokio::main]
async fn main() -> prism_core::Result<()> {
    let args = CliArgs::parse();

    let mut config = PrismConfig::load_or_default(&args.resolve_config_path());
    config.apply_env();
    if let Some(port) = args.port {
        config.general.port = port;
    }
    if let Some(ref db) = args.graph_db {
        config.graph.db_path = db.clone();
    }
    if let Some(ref level) = args.log_level {
        config.general.log_level = level.clone();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(port = config.general.port, "Starting Prism");

    let graph: Arc<dyn GraphStore> = Arc::new(open_graph_store(&config.graph.db_path)?);
    let vectors = Arc::new(MemoryVectorStore::new());
    let status = Arc::new(StoreStatus::new());
    let vocabulary = Arc::new(SchemaVocabulary::photo());

    // Capability wiring: the external model providers need credentials; the
    // offline implementations keep the service usable without any.
    let capability = &config.capability;
    let (extractor, embedder, ranker): (
        Arc<dyn GraphExtractor>,
        Arc<dyn DynEmbeddingService>,
        Arc<dyn AnswerRanker>,
    ) = match capability.api_key.as_deref() {
        Some(key) => (
            Arc::new(OpenAiExtractor::new(
                &capability.api_base,
                key,
                &capability.chat_model,
            )?),
            Arc::new(OpenAiEmbedding::new(
                &capability.api_base,
                key,
                &capability.embedding_model,
            )?),
            Arc::new(OpenAiRanker::new(
                &capability.api_base,
                key,
                &capability.chat_model,
            )?),
        ),
        None => {
            tracing::warn!(
                "No API key configured; using offline extraction, embedding, and ranking"
            );
            (
                Arc::new(KeywordExtractor::new()),
                Arc::new(MockEmbedding::new()),
                Arc::new(FirstPhotoRanker::new()),
            )
        }
    };

    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&graph),
        Arc::clone(&vectors) as Arc<dyn prism_vector::VectorStore>,
        extractor,
        Arc::clone(&embedder),
        vocabulary,
        Arc::clone(&status),
    ));
    let orchestrator = Arc::new(AnswerOrchestrator::new(
        Arc::clone(&graph),
        Arc::clone(&vectors) as Arc<dyn prism_vector::VectorStore>,
        embedder,
        ranker,
        Arc::clone(&status),
        FusionOptions::from(&config.retrieval),
    ));

    let state = AppState::new(
        pipeline,
        orchestrator,
        graph,
        vectors as Arc<dyn prism_vector::VectorStore>,
        status,
    );

    prism_api::start_server(config.general.port, state).await
}
