//! The graph store adapter contract.

use async_trait::async_trait;

use prism_core::error::Result;
use prism_core::types::{Document, GraphEdge, GraphNode};

/// A document returned by the keyword channel: the owning document of one or
/// more entities whose properties matched the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHit {
    pub filename: String,
    pub text: String,
}

/// Narrow contract over the backing graph engine.
///
/// The engine is externally owned; this trait specifies only how Prism uses
/// it. Implementations must make `upsert` transactional and keyed (repeating
/// an upsert leaves the store unchanged) and must never hold a lock across a
/// call into foreign code.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Delete every document, node, edge, and keyword-index row.
    async fn wipe_all(&self) -> Result<()>;

    /// Drop the named fulltext index.
    ///
    /// Returns [`prism_core::PrismError::IndexMissing`] when the index does
    /// not exist. During a reset that kind is expected and tolerated by the
    /// caller; all other errors propagate.
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Transactionally upsert documents, their extracted entities, and edges
    /// (including the reserved MENTIONS links from documents to entities).
    /// Recreates the keyword index if a reset dropped it.
    async fn upsert(
        &self,
        documents: &[Document],
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Result<()>;

    /// Keyword-match entity properties against `query`, traverse MENTIONS
    /// edges back to the owning documents, and return up to `limit` distinct
    /// documents ordered by match strength.
    ///
    /// An absent index (the wipe-to-recreate window) yields an empty result,
    /// not an error.
    async fn fulltext_query(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DocumentHit>>;

    /// Filenames of all stored documents, sorted.
    async fn document_filenames(&self) -> Result<Vec<String>>;

    /// Whether the backing engine is reachable.
    async fn connected(&self) -> bool;
}
