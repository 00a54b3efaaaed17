use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the persisted vector index. Rebuild and query must agree on it.
pub const VECTOR_INDEX: &str = "photo_vectors";

/// Name of the persisted fulltext/keyword index over entity properties.
pub const KEYWORD_INDEX: &str = "photo_keywords";

/// Reserved node label for source documents in the graph store.
pub const DOCUMENT_LABEL: &str = "Document";

/// Reserved relationship linking a document to an entity extracted from it.
/// Not part of the extraction vocabulary; the ingestion pipeline emits it.
pub const MENTIONS_RELATIONSHIP: &str = "MENTIONS";

// =============================================================================
// Ingestion-side types
// =============================================================================

/// One indexed text item: a photo's description keyed by its filename.
///
/// Immutable once ingested; destroyed only by a full rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub text: String,
}

impl Document {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// A typed entity extracted from a document's text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable identifier within the graph (the extractor's surface form).
    pub id: String,
    /// Entity type; must be in the vocabulary's allowed node types.
    pub node_type: String,
    /// Property map; keys must be in the vocabulary's node properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Filename of the document this entity was extracted from.
    pub source: String,
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties: BTreeMap::new(),
            source: source.into(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A typed, directed link between two extracted entities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Relationship type; must be in the vocabulary's allowed relationships.
    pub edge_type: String,
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Property map; keys must be in the vocabulary's relationship properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl GraphEdge {
    pub fn new(
        edge_type: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            edge_type: edge_type.into(),
            from: from.into(),
            to: to.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// One embedding-index entry per document, keyed by filename.
///
/// The source text rides along so the query path can render context without
/// a second round-trip to the graph store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub filename: String,
    pub text: String,
    pub vector: Vec<f32>,
}

// =============================================================================
// Query-side types
// =============================================================================

/// Which retrieval channel(s) produced a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchChannel {
    Vector,
    Graph,
    Both,
}

/// A fused retrieval candidate. Ephemeral, produced only at query time.
///
/// Per-channel evidence is preserved as-is; fusion never computes a blended
/// score. A candidate matched by both channels is strictly higher-confidence
/// than a single-channel match, which the downstream ranker can see from
/// `matched_via`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub filename: String,
    pub matched_via: MatchChannel,
    /// Cosine similarity from the vector channel, when it matched.
    pub vector_score: Option<f64>,
    /// Zero-based position in the graph channel's result order, when it matched.
    pub graph_rank: Option<usize>,
}
