//! Prism vector store adapter and embedding capability.
//!
//! Provides the narrow [`VectorStore`] contract over the backing similarity
//! index (`photo_vectors`), an in-memory cosine implementation, and the
//! [`EmbeddingService`] seam with a deterministic offline implementation and
//! an OpenAI-backed production one.

pub mod embedding;
pub mod store;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OpenAiEmbedding};
pub use store::{MemoryVectorStore, VectorHit, VectorStore};
