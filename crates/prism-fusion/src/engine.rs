//! The query fusion engine.
//!
//! Runs the vector and graph retrieval channels concurrently (their combined
//! latency is the max, not the sum), bounds each with a deadline, and fuses
//! the results. A channel that errors or times out contributes an empty set
//! plus a warning; only both channels failing is fatal. In fail-fast mode a
//! single channel failure aborts the query.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use prism_core::config::RetrievalConfig;
use prism_core::error::{PrismError, Result};
use prism_core::status::StoreStatus;
use prism_core::types::{Candidate, MatchChannel, KEYWORD_INDEX};
use prism_graph::{DocumentHit, GraphStore};
use prism_vector::{DynEmbeddingService, VectorHit, VectorStore};

/// Tunables for one fusion engine instance.
#[derive(Clone, Debug)]
pub struct FusionOptions {
    /// Vector channel top-k.
    pub vector_top_k: usize,
    /// Graph channel distinct-document limit.
    pub graph_limit: usize,
    /// Per-channel deadline.
    pub channel_timeout: Duration,
    /// Fail-fast mode: any single channel failure aborts the query.
    pub require_both_channels: bool,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            vector_top_k: 3,
            graph_limit: 3,
            channel_timeout: Duration::from_secs(10),
            require_both_channels: false,
        }
    }
}

impl From<&RetrievalConfig> for FusionOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_top_k: config.vector_top_k,
            graph_limit: config.graph_limit,
            channel_timeout: config.channel_timeout(),
            require_both_channels: config.require_both_channels,
        }
    }
}

/// The fused output handed to the answer orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusedContext {
    /// Deterministic textual context: vector block then graph block, both
    /// verbatim so the ranker sees channel provenance.
    pub context: String,
    /// Union of both channels, one entry per filename.
    pub candidates: Vec<Candidate>,
    /// True when any channel under-delivered (error, timeout, or the
    /// rebuild window was open).
    pub degraded: bool,
    pub warnings: Vec<String>,
}

/// One channel's fate after its deadline-bounded call.
enum ChannelOutcome<T> {
    Hits(Vec<T>),
    Failed(String),
    TimedOut,
}

impl<T> ChannelOutcome<T> {
    fn hits(&self) -> &[T] {
        match self {
            ChannelOutcome::Hits(hits) => hits,
            _ => &[],
        }
    }

    fn succeeded(&self) -> bool {
        matches!(self, ChannelOutcome::Hits(_))
    }
}

/// Dual-channel retrieval over the two store adapters.
pub struct FusionEngine {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn DynEmbeddingService>,
    status: Arc<StoreStatus>,
    options: FusionOptions,
}

impl FusionEngine {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn DynEmbeddingService>,
        status: Arc<StoreStatus>,
        options: FusionOptions,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
            status,
            options,
        }
    }

    /// Run both channels and fuse their results.
    ///
    /// Zero results from both healthy channels still produces an (empty)
    /// context; deciding what "no evidence" means is the ranker's job.
    pub async fn retrieve(&self, query: &str) -> Result<FusedContext> {
        let mut warnings = Vec::new();
        if self.status.is_rebuilding() {
            warnings.push(
                "rebuild in progress: results may be transiently empty or incomplete".to_string(),
            );
        }

        let timeout = self.options.channel_timeout;

        // The vector channel embeds the query first; a hung embedding
        // capability counts against the same deadline as the search itself.
        let vector_call = async {
            let query_vector = self.embedder.embed_boxed(query).await?;
            self.vectors
                .similarity_search(&query_vector, self.options.vector_top_k)
                .await
        };
        let graph_call = self
            .graph
            .fulltext_query(KEYWORD_INDEX, query, self.options.graph_limit);

        let (vector_result, graph_result) = tokio::join!(
            tokio::time::timeout(timeout, vector_call),
            tokio::time::timeout(timeout, graph_call),
        );

        let vector_outcome = collapse(vector_result);
        let graph_outcome = collapse(graph_result);

        self.check_fatal(&vector_outcome, &graph_outcome)?;
        push_warning(&mut warnings, "vector", &vector_outcome);
        push_warning(&mut warnings, "graph", &graph_outcome);

        let vector_hits = vector_outcome.hits();
        let graph_hits = graph_outcome.hits();

        let candidates = fuse_candidates(vector_hits, graph_hits);
        let context = render_context(vector_hits, graph_hits);

        debug!(
            query,
            vector_hits = vector_hits.len(),
            graph_hits = graph_hits.len(),
            candidates = candidates.len(),
            degraded = !warnings.is_empty(),
            "Fusion complete"
        );

        Ok(FusedContext {
            context,
            candidates,
            degraded: !warnings.is_empty(),
            warnings,
        })
    }

    /// Both channels failing is fatal; in fail-fast mode any failure is.
    fn check_fatal(
        &self,
        vector: &ChannelOutcome<VectorHit>,
        graph: &ChannelOutcome<DocumentHit>,
    ) -> Result<()> {
        match (vector, graph) {
            (ChannelOutcome::TimedOut, ChannelOutcome::TimedOut) => {
                Err(PrismError::ChannelTimeout(
                    "both retrieval channels exceeded the deadline".to_string(),
                ))
            }
            (v, g) if !v.succeeded() && !g.succeeded() => Err(PrismError::StoreUnavailable(
                "both retrieval channels failed".to_string(),
            )),
            (v, g) if self.options.require_both_channels => {
                if let ChannelOutcome::TimedOut = v {
                    return Err(PrismError::ChannelTimeout(
                        "vector channel exceeded the deadline".to_string(),
                    ));
                }
                if let ChannelOutcome::TimedOut = g {
                    return Err(PrismError::ChannelTimeout(
                        "graph channel exceeded the deadline".to_string(),
                    ));
                }
                if let ChannelOutcome::Failed(msg) = v {
                    return Err(PrismError::StoreUnavailable(format!(
                        "vector channel failed: {}",
                        msg
                    )));
                }
                if let ChannelOutcome::Failed(msg) = g {
                    return Err(PrismError::StoreUnavailable(format!(
                        "graph channel failed: {}",
                        msg
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn collapse<T>(
    result: std::result::Result<Result<Vec<T>>, tokio::time::error::Elapsed>,
) -> ChannelOutcome<T> {
    match result {
        Ok(Ok(hits)) => ChannelOutcome::Hits(hits),
        Ok(Err(e)) => ChannelOutcome::Failed(e.to_string()),
        Err(_) => ChannelOutcome::TimedOut,
    }
}

fn push_warning<T>(warnings: &mut Vec<String>, channel: &str, outcome: &ChannelOutcome<T>) {
    match outcome {
        ChannelOutcome::Hits(_) => {}
        ChannelOutcome::Failed(msg) => {
            warn!(channel, error = %msg, "Retrieval channel failed; continuing degraded");
            warnings.push(format!("{} channel failed: {}", channel, msg));
        }
        ChannelOutcome::TimedOut => {
            warn!(channel, "Retrieval channel timed out; continuing degraded");
            warnings.push(format!("{} channel timed out", channel));
        }
    }
}

/// Union both channels by filename, preserving per-channel evidence.
///
/// Vector candidates come first in descending similarity; graph-only
/// candidates follow in channel order. A filename in both channels yields
/// exactly one candidate with `matched_via = Both`.
fn fuse_candidates(vector_hits: &[VectorHit], graph_hits: &[DocumentHit]) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = vector_hits
        .iter()
        .map(|hit| Candidate {
            filename: hit.filename.clone(),
            matched_via: MatchChannel::Vector,
            vector_score: Some(hit.score),
            graph_rank: None,
        })
        .collect();

    for (rank, hit) in graph_hits.iter().enumerate() {
        if let Some(existing) = candidates.iter_mut().find(|c| c.filename == hit.filename) {
            existing.matched_via = MatchChannel::Both;
            existing.graph_rank = Some(rank);
        } else {
            candidates.push(Candidate {
                filename: hit.filename.clone(),
                matched_via: MatchChannel::Graph,
                vector_score: None,
                graph_rank: Some(rank),
            });
        }
    }

    candidates
}

/// Render the two result blocks verbatim, vector channel first.
///
/// No cross-block dedup happens here: the ranker is meant to see which
/// channel surfaced each document.
fn render_context(vector_hits: &[VectorHit], graph_hits: &[DocumentHit]) -> String {
    let mut context = String::from("Vector Search Results:\n");
    for hit in vector_hits {
        context.push_str(&format!("Photo {}: {}\n", hit.filename, hit.text));
    }
    context.push_str("\nGraph Search Results:\n");
    for hit in graph_hits {
        context.push_str(&format!("Photo {}: {}\n", hit.filename, hit.text));
    }
    context
}
