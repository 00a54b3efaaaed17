//! The ingestion pipeline: reset/rebuild and incremental-add flows.
//!
//! Both entry points are idempotent with respect to final store state and
//! serialize their writes behind one lock. A rebuild raises the shared
//! rebuild flag for its whole wipe-to-recreate window so the query path can
//! surface it instead of silently reading a half-built store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use prism_core::error::{PrismError, Result};
use prism_core::schema::SchemaVocabulary;
use prism_core::status::StoreStatus;
use prism_core::types::{
    Document, EmbeddingEntry, GraphEdge, GraphNode, KEYWORD_INDEX, MENTIONS_RELATIONSHIP,
    VECTOR_INDEX,
};
use prism_graph::GraphStore;
use prism_vector::{DynEmbeddingService, VectorStore};

use crate::extract::GraphExtractor;

/// Which per-document stage failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    Embedding,
}

/// Outcome of one document inside a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OutcomeStatus {
    /// Committed to both channels.
    Indexed {
        nodes: usize,
        edges: usize,
        dropped: usize,
    },
    /// One stage failed; reported, batch continued.
    Failed { stage: FailureStage, message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub filename: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Result of a full rebuild: per-document outcomes plus batch totals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebuildReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub document_count: usize,
    pub dropped_entities: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RebuildReport {
    /// Number of documents whose extraction or embedding failed.
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
            .count()
    }
}

/// Result of a successful incremental add.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddReport {
    pub filename: String,
    pub nodes: usize,
    pub edges: usize,
    pub dropped_entities: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// The ingestion pipeline over the two store adapters and the external
/// extraction/embedding capabilities.
pub struct IngestionPipeline {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    extractor: Arc<dyn GraphExtractor>,
    embedder: Arc<dyn DynEmbeddingService>,
    vocabulary: Arc<SchemaVocabulary>,
    status: Arc<StoreStatus>,
    /// Serializes rebuilds and incremental adds with respect to each other.
    write_lock: tokio::sync::Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        extractor: Arc<dyn GraphExtractor>,
        embedder: Arc<dyn DynEmbeddingService>,
        vocabulary: Arc<SchemaVocabulary>,
        status: Arc<StoreStatus>,
    ) -> Self {
        Self {
            graph,
            vectors,
            extractor,
            embedder,
            vocabulary,
            status,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn vocabulary(&self) -> &SchemaVocabulary {
        &self.vocabulary
    }

    /// Wipe both stores and rebuild them from the given document set.
    ///
    /// Rebuild is drop-then-recreate, not merge: both indexes are dropped
    /// first (a missing index is expected and tolerated), then every document
    /// is extracted, validated, and committed. A single document's extraction
    /// or embedding failure is recorded in its outcome and the batch
    /// continues; its Document row and embedding (when obtainable) are still
    /// committed so the two channels stay aligned.
    pub async fn rebuild_all(&self, documents: &BTreeMap<String, String>) -> Result<RebuildReport> {
        let _write = self.write_lock.lock().await;
        let started = Instant::now();
        let _rebuild = self.status.begin_rebuild();

        info!(documents = documents.len(), "Rebuilding knowledge graph");

        tolerate_missing(self.graph.drop_index(KEYWORD_INDEX).await, KEYWORD_INDEX)?;
        tolerate_missing(self.vectors.drop_index(VECTOR_INDEX).await, VECTOR_INDEX)?;
        self.graph.wipe_all().await?;
        self.vectors.wipe_all().await?;

        let mut batch_documents = Vec::new();
        let mut batch_nodes = Vec::new();
        let mut batch_edges = Vec::new();
        let mut outcomes = Vec::new();
        let mut dropped_total = 0;

        for (filename, text) in documents {
            let document = Document::new(filename, text);

            match self.extractor.extract(&document, &self.vocabulary).await {
                Ok(extraction) => {
                    let (nodes, edges, dropped) =
                        self.validate_extraction(extraction.nodes, extraction.edges);
                    dropped_total += dropped;
                    batch_edges.extend(mention_edges(filename, &nodes));
                    outcomes.push(DocumentOutcome {
                        filename: filename.clone(),
                        status: OutcomeStatus::Indexed {
                            nodes: nodes.len(),
                            edges: edges.len(),
                            dropped,
                        },
                    });
                    batch_nodes.extend(nodes);
                    batch_edges.extend(edges);
                }
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Extraction failed; document kept without entities");
                    outcomes.push(DocumentOutcome {
                        filename: filename.clone(),
                        status: OutcomeStatus::Failed {
                            stage: FailureStage::Extraction,
                            message: e.to_string(),
                        },
                    });
                }
            }

            batch_documents.push(document);
        }

        self.graph
            .upsert(&batch_documents, &batch_nodes, &batch_edges)
            .await?;

        let mut entries = Vec::new();
        for document in &batch_documents {
            match self.embedder.embed_boxed(&document.text).await {
                Ok(vector) => entries.push(EmbeddingEntry {
                    filename: document.filename.clone(),
                    text: document.text.clone(),
                    vector,
                }),
                Err(e) => {
                    warn!(filename = %document.filename, error = %e, "Embedding failed");
                    mark_failed(
                        &mut outcomes,
                        &document.filename,
                        FailureStage::Embedding,
                        e.to_string(),
                    );
                }
            }
        }
        self.vectors.upsert_embeddings(&entries).await?;

        let report = RebuildReport {
            document_count: batch_documents.len(),
            dropped_entities: dropped_total,
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            documents = report.document_count,
            failed = report.failed_count(),
            dropped_entities = report.dropped_entities,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Rebuild complete"
        );
        Ok(report)
    }

    /// Add one document to the existing stores without a rebuild.
    ///
    /// Capability calls run before any write, so the only partial-write
    /// window is between the graph commit and the vector commit; a failure
    /// there surfaces as [`PrismError::PartialWrite`] naming which half
    /// committed, never silently. Repeating an add for the same filename
    /// upserts by key in both channels.
    pub async fn add_one(&self, filename: &str, text: &str) -> Result<AddReport> {
        let _write = self.write_lock.lock().await;
        let started = Instant::now();

        let document = Document::new(filename, text);

        let extraction = self.extractor.extract(&document, &self.vocabulary).await?;
        let (nodes, mut edges, dropped) =
            self.validate_extraction(extraction.nodes, extraction.edges);

        let vector = self.embedder.embed_boxed(text).await?;

        let mut all_edges = mention_edges(filename, &nodes);
        all_edges.append(&mut edges);

        self.graph
            .upsert(&[document.clone()], &nodes, &all_edges)
            .await?;

        let entry = EmbeddingEntry {
            filename: filename.to_string(),
            text: text.to_string(),
            vector,
        };
        if let Err(e) = self.vectors.upsert_embeddings(&[entry]).await {
            warn!(filename, error = %e, "Vector upsert failed after graph commit");
            return Err(PrismError::PartialWrite {
                filename: filename.to_string(),
                graph_committed: true,
                vector_committed: false,
            });
        }

        let report = AddReport {
            filename: filename.to_string(),
            nodes: nodes.len(),
            edges: all_edges.len(),
            dropped_entities: dropped,
            elapsed: started.elapsed(),
        };
        info!(
            filename,
            nodes = report.nodes,
            edges = report.edges,
            "Photo added"
        );
        Ok(report)
    }

    /// Drop vocabulary violations, and edges left dangling by dropped nodes.
    fn validate_extraction(
        &self,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    ) -> (Vec<GraphNode>, Vec<GraphEdge>, usize) {
        let mut dropped = 0;

        let kept_nodes: Vec<GraphNode> = nodes
            .into_iter()
            .filter(|node| match self.vocabulary.validate_node(node) {
                Ok(()) => true,
                Err(e) => {
                    warn!(node = %node.id, error = %e, "Dropping entity outside vocabulary");
                    dropped += 1;
                    false
                }
            })
            .collect();

        let kept_ids: std::collections::BTreeSet<&str> =
            kept_nodes.iter().map(|n| n.id.as_str()).collect();

        let kept_edges: Vec<GraphEdge> = edges
            .into_iter()
            .filter(|edge| {
                if let Err(e) = self.vocabulary.validate_edge(edge) {
                    warn!(from = %edge.from, to = %edge.to, error = %e, "Dropping relationship outside vocabulary");
                    dropped += 1;
                    return false;
                }
                if !kept_ids.contains(edge.from.as_str()) || !kept_ids.contains(edge.to.as_str()) {
                    warn!(from = %edge.from, to = %edge.to, "Dropping relationship with dropped endpoint");
                    dropped += 1;
                    return false;
                }
                true
            })
            .collect();

        (kept_nodes, kept_edges, dropped)
    }
}

/// Reset-time drops treat a missing index as expected; anything else re-raises.
fn tolerate_missing(result: Result<()>, index: &str) -> Result<()> {
    match result {
        Err(PrismError::IndexMissing(_)) => {
            debug!(index, "No index to drop");
            Ok(())
        }
        other => other,
    }
}

/// The reserved Document→entity links for a batch of validated nodes.
fn mention_edges(filename: &str, nodes: &[GraphNode]) -> Vec<GraphEdge> {
    nodes
        .iter()
        .map(|node| GraphEdge::new(MENTIONS_RELATIONSHIP, filename, &node.id))
        .collect()
}

fn mark_failed(
    outcomes: &mut [DocumentOutcome],
    filename: &str,
    stage: FailureStage,
    message: String,
) {
    if let Some(outcome) = outcomes.iter_mut().find(|o| o.filename == filename) {
        // An earlier extraction failure stays the primary cause.
        if matches!(outcome.status, OutcomeStatus::Indexed { .. }) {
            outcome.status = OutcomeStatus::Failed { stage, message };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prism_graph::SqliteGraphStore;
    use prism_vector::{MemoryVectorStore, MockEmbedding};

    use self::test_support::*;

    use crate::extract::{Extraction, KeywordExtractor};

    /// Test doubles local to this module.
    mod test_support {
        use super::*;
        use prism_core::error::{PrismError, Result};
        use prism_core::types::EmbeddingEntry;
        use prism_vector::{VectorHit, VectorStore};

        /// Extractor that fails for one specific filename.
        pub struct FailingExtractor {
            pub fail_for: String,
            pub inner: KeywordExtractor,
        }

        #[async_trait]
        impl GraphExtractor for FailingExtractor {
            async fn extract(
                &self,
                document: &Document,
                vocabulary: &SchemaVocabulary,
            ) -> Result<Extraction> {
                if document.filename == self.fail_for {
                    return Err(PrismError::Extraction("model unavailable".to_string()));
                }
                self.inner.extract(document, vocabulary).await
            }
        }

        /// Extractor that returns a fixed fragment regardless of input.
        pub struct StubExtractor {
            pub nodes: Vec<GraphNode>,
            pub edges: Vec<GraphEdge>,
        }

        #[async_trait]
        impl GraphExtractor for StubExtractor {
            async fn extract(
                &self,
                _document: &Document,
                _vocabulary: &SchemaVocabulary,
            ) -> Result<Extraction> {
                Ok(Extraction {
                    nodes: self.nodes.clone(),
                    edges: self.edges.clone(),
                })
            }
        }

        /// Vector store whose upsert always fails; everything else delegates
        /// to a real in-memory store.
        pub struct BrokenVectorStore {
            pub inner: prism_vector::MemoryVectorStore,
        }

        #[async_trait]
        impl VectorStore for BrokenVectorStore {
            async fn wipe_all(&self) -> Result<()> {
                self.inner.wipe_all().await
            }
            async fn drop_index(&self, name: &str) -> Result<()> {
                self.inner.drop_index(name).await
            }
            async fn upsert_embeddings(&self, _entries: &[EmbeddingEntry]) -> Result<()> {
                Err(PrismError::StoreUnavailable("vector store down".to_string()))
            }
            async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
                self.inner.similarity_search(query, k).await
            }
            async fn embedding_filenames(&self) -> Result<Vec<String>> {
                self.inner.embedding_filenames().await
            }
            fn initialized(&self) -> bool {
                self.inner.initialized()
            }
        }
    }

    struct Fixture {
        graph: Arc<SqliteGraphStore>,
        vectors: Arc<MemoryVectorStore>,
        status: Arc<StoreStatus>,
        pipeline: IngestionPipeline,
    }

    fn fixture_with(extractor: Arc<dyn GraphExtractor>) -> Fixture {
        let graph = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new());
        let status = Arc::new(StoreStatus::new());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&graph) as Arc<dyn GraphStore>,
            Arc::clone(&vectors) as Arc<dyn VectorStore>,
            extractor,
            Arc::new(MockEmbedding::new()),
            Arc::new(SchemaVocabulary::photo()),
            Arc::clone(&status),
        );
        Fixture {
            graph,
            vectors,
            status,
            pipeline,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(KeywordExtractor::new()))
    }

    fn photo_set() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "a.jpg".to_string(),
                "a serene mountain lake".to_string(),
            ),
            ("b.jpg".to_string(), "a busy desert storm".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_rebuild_covers_both_channels() {
        let fx = fixture();
        let report = fx.pipeline.rebuild_all(&photo_set()).await.unwrap();

        assert_eq!(report.document_count, 2);
        assert_eq!(report.failed_count(), 0);

        let graph_files = fx.graph.document_filenames().await.unwrap();
        let vector_files = fx.vectors.embedding_filenames().await.unwrap();
        assert_eq!(graph_files, vec!["a.jpg", "b.jpg"]);
        assert_eq!(graph_files, vector_files);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let fx = fixture();
        fx.pipeline.rebuild_all(&photo_set()).await.unwrap();
        let counts_first = fx.graph.counts().unwrap();

        fx.pipeline.rebuild_all(&photo_set()).await.unwrap();
        let counts_second = fx.graph.counts().unwrap();

        assert_eq!(counts_first, counts_second);
        assert_eq!(fx.vectors.embedding_filenames().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_contents() {
        let fx = fixture();
        fx.pipeline.rebuild_all(&photo_set()).await.unwrap();

        let only_one = BTreeMap::from([(
            "c.jpg".to_string(),
            "a cozy cabin in the forest".to_string(),
        )]);
        fx.pipeline.rebuild_all(&only_one).await.unwrap();

        assert_eq!(
            fx.graph.document_filenames().await.unwrap(),
            vec!["c.jpg"]
        );
        assert_eq!(
            fx.vectors.embedding_filenames().await.unwrap(),
            vec!["c.jpg"]
        );
    }

    #[tokio::test]
    async fn test_rebuild_drops_invalid_entities_keeps_valid() {
        let extractor = StubExtractor {
            nodes: vec![
                GraphNode::new("lake", "NaturalFeature", "a.jpg")
                    .with_property("description", "a lake"),
                GraphNode::new("ufo", "Spaceship", "a.jpg"),
            ],
            edges: vec![GraphEdge::new("NEXT_TO", "lake", "ufo")],
        };
        let fx = fixture_with(Arc::new(extractor));

        let docs = BTreeMap::from([("a.jpg".to_string(), "a lake and a ufo".to_string())]);
        let report = fx.pipeline.rebuild_all(&docs).await.unwrap();

        // The invalid node and its dangling edge are dropped; the batch commits.
        assert_eq!(report.failed_count(), 0);
        assert_eq!(report.dropped_entities, 2);
        let (_, nodes, edges) = fx.graph.counts().unwrap();
        assert_eq!(nodes, 1);
        // Only the MENTIONS edge for the surviving node remains.
        assert_eq!(edges, 1);
    }

    #[tokio::test]
    async fn test_rebuild_continues_past_extraction_failure() {
        let extractor = FailingExtractor {
            fail_for: "a.jpg".to_string(),
            inner: KeywordExtractor::new(),
        };
        let fx = fixture_with(Arc::new(extractor));

        let report = fx.pipeline.rebuild_all(&photo_set()).await.unwrap();
        assert_eq!(report.failed_count(), 1);

        let failed = report
            .outcomes
            .iter()
            .find(|o| o.filename == "a.jpg")
            .unwrap();
        assert!(matches!(
            failed.status,
            OutcomeStatus::Failed {
                stage: FailureStage::Extraction,
                ..
            }
        ));

        // The failed document still exists in both channels, just without entities.
        assert_eq!(
            fx.graph.document_filenames().await.unwrap(),
            vec!["a.jpg", "b.jpg"]
        );
        assert_eq!(
            fx.vectors.embedding_filenames().await.unwrap(),
            vec!["a.jpg", "b.jpg"]
        );
    }

    #[tokio::test]
    async fn test_rebuild_marks_embedding_failure() {
        // Empty text cannot be embedded; the document's outcome records it.
        let fx = fixture();
        let docs = BTreeMap::from([
            ("a.jpg".to_string(), "a serene mountain lake".to_string()),
            ("empty.jpg".to_string(), String::new()),
        ]);
        let report = fx.pipeline.rebuild_all(&docs).await.unwrap();

        assert_eq!(report.failed_count(), 1);
        let failed = report
            .outcomes
            .iter()
            .find(|o| o.filename == "empty.jpg")
            .unwrap();
        assert!(matches!(
            failed.status,
            OutcomeStatus::Failed {
                stage: FailureStage::Embedding,
                ..
            }
        ));
        // The healthy document is committed to the vector channel regardless.
        assert_eq!(
            fx.vectors.embedding_filenames().await.unwrap(),
            vec!["a.jpg"]
        );
    }

    #[tokio::test]
    async fn test_add_one_commits_both_channels() {
        let fx = fixture();
        fx.pipeline.rebuild_all(&photo_set()).await.unwrap();

        let report = fx
            .pipeline
            .add_one("c.jpg", "a dramatic waterfall at sunrise")
            .await
            .unwrap();
        assert!(report.nodes >= 2);

        assert!(fx
            .graph
            .document_filenames()
            .await
            .unwrap()
            .contains(&"c.jpg".to_string()));
        assert!(fx
            .vectors
            .embedding_filenames()
            .await
            .unwrap()
            .contains(&"c.jpg".to_string()));
    }

    #[tokio::test]
    async fn test_add_one_does_not_touch_existing_documents() {
        let fx = fixture();
        fx.pipeline.rebuild_all(&photo_set()).await.unwrap();
        fx.pipeline
            .add_one("c.jpg", "a quiet harbor village")
            .await
            .unwrap();

        assert_eq!(
            fx.graph.document_filenames().await.unwrap(),
            vec!["a.jpg", "b.jpg", "c.jpg"]
        );
    }

    #[tokio::test]
    async fn test_add_one_upserts_by_filename() {
        let fx = fixture();
        fx.pipeline
            .add_one("a.jpg", "a serene mountain lake")
            .await
            .unwrap();
        fx.pipeline
            .add_one("a.jpg", "a frozen mountain lake")
            .await
            .unwrap();

        assert_eq!(fx.graph.document_filenames().await.unwrap(), vec!["a.jpg"]);
        assert_eq!(
            fx.vectors.embedding_filenames().await.unwrap(),
            vec!["a.jpg"]
        );
    }

    #[tokio::test]
    async fn test_add_one_extraction_failure_fails_call() {
        let extractor = FailingExtractor {
            fail_for: "c.jpg".to_string(),
            inner: KeywordExtractor::new(),
        };
        let fx = fixture_with(Arc::new(extractor));

        let err = fx.pipeline.add_one("c.jpg", "anything").await.unwrap_err();
        assert!(matches!(err, PrismError::Extraction(_)));
        // Nothing was written.
        assert!(fx.graph.document_filenames().await.unwrap().is_empty());
        assert!(fx.vectors.embedding_filenames().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_one_partial_write_is_surfaced() {
        let graph = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let vectors = Arc::new(BrokenVectorStore {
            inner: MemoryVectorStore::new(),
        });
        let pipeline = IngestionPipeline::new(
            Arc::clone(&graph) as Arc<dyn GraphStore>,
            vectors as Arc<dyn VectorStore>,
            Arc::new(KeywordExtractor::new()),
            Arc::new(MockEmbedding::new()),
            Arc::new(SchemaVocabulary::photo()),
            Arc::new(StoreStatus::new()),
        );

        let err = pipeline
            .add_one("a.jpg", "a serene mountain lake")
            .await
            .unwrap_err();
        match err {
            PrismError::PartialWrite {
                filename,
                graph_committed,
                vector_committed,
            } => {
                assert_eq!(filename, "a.jpg");
                assert!(graph_committed);
                assert!(!vector_committed);
            }
            other => panic!("expected PartialWrite, got {:?}", other),
        }
        // The graph half really is committed, exactly as reported.
        assert_eq!(graph.document_filenames().await.unwrap(), vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn test_mention_edges_link_document_to_entities() {
        let fx = fixture();
        fx.pipeline
            .add_one("a.jpg", "a serene mountain lake")
            .await
            .unwrap();

        // The keyword channel reaches the document through MENTIONS edges.
        let hits = fx
            .graph
            .fulltext_query(KEYWORD_INDEX, "mountain", 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "a.jpg");
    }

    #[tokio::test]
    async fn test_rebuild_clears_rebuild_flag_after_completion() {
        let fx = fixture();
        fx.pipeline.rebuild_all(&photo_set()).await.unwrap();
        assert!(!fx.status.is_rebuilding());
    }
}
