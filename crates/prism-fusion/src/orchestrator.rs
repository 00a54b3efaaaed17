//! Answer orchestrator: fused retrieval composed with the ranking capability.
//!
//! The retrieval engine is built exactly once per process on first use. The
//! one-time gate is a `tokio::sync::OnceCell`, not a check-then-act flag, so
//! concurrent first queries cannot double-initialize. Answers are never
//! cached across queries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use prism_core::error::Result;
use prism_core::status::StoreStatus;
use prism_graph::GraphStore;
use prism_vector::{DynEmbeddingService, VectorStore};

use crate::engine::{FusionEngine, FusionOptions};
use crate::ranker::AnswerRanker;

/// The final answer plus retrieval-quality metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Answer {
    /// The ranking capability's output, verbatim.
    pub result: String,
    /// True when retrieval under-delivered (channel failure, timeout, or an
    /// open rebuild window).
    pub degraded: bool,
    pub warnings: Vec<String>,
}

/// Composition of the fusion engine with the external ranking capability.
pub struct AnswerOrchestrator {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn DynEmbeddingService>,
    ranker: Arc<dyn AnswerRanker>,
    status: Arc<StoreStatus>,
    options: FusionOptions,
    engine: tokio::sync::OnceCell<Arc<FusionEngine>>,
}

impl AnswerOrchestrator {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn DynEmbeddingService>,
        ranker: Arc<dyn AnswerRanker>,
        status: Arc<StoreStatus>,
        options: FusionOptions,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
            ranker,
            status,
            options,
            engine: tokio::sync::OnceCell::new(),
        }
    }

    /// The lazily-built retrieval engine; first call wins, all others wait.
    async fn engine(&self) -> &Arc<FusionEngine> {
        self.engine
            .get_or_init(|| async {
                info!("Building retrieval engine");
                Arc::new(FusionEngine::new(
                    Arc::clone(&self.graph),
                    Arc::clone(&self.vectors),
                    Arc::clone(&self.embedder),
                    Arc::clone(&self.status),
                    self.options.clone(),
                ))
            })
            .await
    }

    /// Answer one query: fuse both channels, then hand `{context, query}` to
    /// the ranking capability and return its output verbatim.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let engine = self.engine().await;
        let fused = engine.retrieve(query).await?;
        let result = self.ranker.rank(&fused.context, query).await?;
        Ok(Answer {
            result,
            degraded: fused.degraded,
            warnings: fused.warnings,
        })
    }

    /// Whether the first query has built the retrieval engine yet.
    pub fn engine_initialized(&self) -> bool {
        self.engine.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prism_core::types::{Document, EmbeddingEntry, GraphEdge, GraphNode};
    use prism_graph::SqliteGraphStore;
    use prism_vector::embedding::EmbeddingService;
    use prism_vector::{MemoryVectorStore, MockEmbedding};

    use crate::ranker::FirstPhotoRanker;

    /// Ranker that counts invocations.
    struct CountingRanker {
        calls: AtomicUsize,
        inner: FirstPhotoRanker,
    }

    #[async_trait]
    impl AnswerRanker for CountingRanker {
        async fn rank(&self, context: &str, query: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rank(context, query).await
        }
    }

    async fn seeded_orchestrator(ranker: Arc<dyn AnswerRanker>) -> Arc<AnswerOrchestrator> {
        let graph = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new());
        let embedder = MockEmbedding::new();

        let text = "a serene mountain lake";
        graph
            .upsert(
                &[Document::new("a.jpg", text)],
                &[GraphNode::new("lake", "NaturalFeature", "a.jpg")
                    .with_property("description", "lake")],
                &[GraphEdge::new("MENTIONS", "a.jpg", "lake")],
            )
            .await
            .unwrap();
        vectors
            .upsert_embeddings(&[EmbeddingEntry {
                filename: "a.jpg".to_string(),
                text: text.to_string(),
                vector: embedder.embed(text).await.unwrap(),
            }])
            .await
            .unwrap();

        Arc::new(AnswerOrchestrator::new(
            graph,
            vectors,
            Arc::new(MockEmbedding::new()),
            ranker,
            Arc::new(StoreStatus::new()),
            FusionOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_answer_returns_ranker_output_verbatim() {
        let orchestrator = seeded_orchestrator(Arc::new(FirstPhotoRanker::new())).await;
        let answer = orchestrator.answer("mountain lake").await.unwrap();
        assert_eq!(answer.result, "Filename: a.jpg");
        assert!(!answer.degraded);
    }

    #[tokio::test]
    async fn test_engine_built_lazily_on_first_answer() {
        let orchestrator = seeded_orchestrator(Arc::new(FirstPhotoRanker::new())).await;
        assert!(!orchestrator.engine_initialized());
        orchestrator.answer("mountain lake").await.unwrap();
        assert!(orchestrator.engine_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_first_answers_all_succeed() {
        let ranker = Arc::new(CountingRanker {
            calls: AtomicUsize::new(0),
            inner: FirstPhotoRanker::new(),
        });
        let orchestrator = seeded_orchestrator(Arc::clone(&ranker) as Arc<dyn AnswerRanker>).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orch = Arc::clone(&orchestrator);
            handles.push(tokio::spawn(
                async move { orch.answer("mountain lake").await },
            ));
        }
        for handle in handles {
            let answer = handle.await.unwrap().unwrap();
            assert_eq!(answer.result, "Filename: a.jpg");
        }

        // Every query ran the ranker; the engine was built once.
        assert_eq!(ranker.calls.load(Ordering::SeqCst), 8);
        assert!(orchestrator.engine_initialized());
    }

    #[tokio::test]
    async fn test_no_answer_caching_between_queries() {
        let ranker = Arc::new(CountingRanker {
            calls: AtomicUsize::new(0),
            inner: FirstPhotoRanker::new(),
        });
        let orchestrator = seeded_orchestrator(Arc::clone(&ranker) as Arc<dyn AnswerRanker>).await;

        orchestrator.answer("mountain lake").await.unwrap();
        orchestrator.answer("mountain lake").await.unwrap();
        assert_eq!(ranker.calls.load(Ordering::SeqCst), 2);
    }
}
