//! Vector store adapter: contract plus the in-memory cosine implementation.
//!
//! The index is keyed by filename — upserting an existing filename replaces
//! its entry. Search is brute-force cosine over all entries, which is O(n)
//! and acceptable for the moderate catalog sizes this service targets.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, info};

use prism_core::error::{PrismError, Result};
use prism_core::types::{EmbeddingEntry, VECTOR_INDEX};

/// A single hit from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub filename: String,
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f64,
}

/// Narrow contract over the backing similarity index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Delete every embedding entry.
    async fn wipe_all(&self) -> Result<()>;

    /// Drop the named index. Returns
    /// [`prism_core::PrismError::IndexMissing`] when it does not exist;
    /// callers during reset tolerate that kind and continue.
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Upsert entries by filename, creating the index on first use.
    async fn upsert_embeddings(&self, entries: &[EmbeddingEntry]) -> Result<()>;

    /// Top-k nearest documents by cosine similarity, descending.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Filenames of all indexed documents, sorted.
    async fn embedding_filenames(&self) -> Result<Vec<String>>;

    /// Whether the index has been created (survives wipe, not drop).
    fn initialized(&self) -> bool;
}

#[derive(Debug, Default)]
struct IndexState {
    /// Present once the index has been created; None after a drop.
    created: bool,
    entries: HashMap<String, EmbeddingEntry>,
}

/// In-memory vector store with brute-force cosine search.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    state: RwLock<IndexState>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|e| PrismError::Storage(format!("vector index lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|e| PrismError::Storage(format!("vector index lock poisoned: {}", e)))
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn wipe_all(&self) -> Result<()> {
        self.write()?.entries.clear();
        info!("Vector store wiped");
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let mut state = self.write()?;
        if name != VECTOR_INDEX || !state.created {
            return Err(PrismError::IndexMissing(name.to_string()));
        }
        state.created = false;
        state.entries.clear();
        debug!(index = name, "Vector index dropped");
        Ok(())
    }

    async fn upsert_embeddings(&self, entries: &[EmbeddingEntry]) -> Result<()> {
        let mut state = self.write()?;
        state.created = true;
        for entry in entries {
            state.entries.insert(entry.filename.clone(), entry.clone());
        }
        debug!(count = entries.len(), "Embeddings upserted");
        Ok(())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let state = self.read()?;

        let mut hits: Vec<VectorHit> = state
            .entries
            .values()
            .map(|entry| VectorHit {
                filename: entry.filename.clone(),
                text: entry.text.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        // Descending score; filename tiebreak keeps the order deterministic.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn embedding_filenames(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        let mut filenames: Vec<String> = state.entries.keys().cloned().collect();
        filenames.sort();
        Ok(filenames)
    }

    fn initialized(&self) -> bool {
        self.read().map(|s| s.created).unwrap_or(false)
    }
}
