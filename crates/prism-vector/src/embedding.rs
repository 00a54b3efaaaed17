//! Embedding capability seam and implementations.
//!
//! - `OpenAiEmbedding` calls an OpenAI-compatible `/embeddings` endpoint over
//!   HTTP. This is the production backend.
//! - `MockEmbedding` produces deterministic bag-of-words vectors: two texts
//!   sharing vocabulary score proportionally higher cosine similarity, so
//!   semantic-overlap behavior is testable offline.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use prism_core::error::{PrismError, Result};

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. Used for both
/// ingestion (one vector per document) and search (the query vector).
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl std::future::Future<Output = Result<Vec<f32>>> + Send;

    /// Dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future`, so the trait is not
/// object-safe. This wrapper boxes the future; the blanket impl below lets
/// any `EmbeddingService` be stored as `Arc<dyn DynEmbeddingService>`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// OpenAiEmbedding - HTTP embedding backend
// ---------------------------------------------------------------------------

/// Embedding service backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_base: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedding {
    /// Create a provider for the given endpoint, key, and model.
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(PrismError::Config(
                "embedding capability requires an API key".to_string(),
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse()
                .map_err(|e| PrismError::Config(format!("invalid API key header: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(|e| PrismError::Config(format!("build HTTP client: {}", e)))?;

        let dimensions = if model.contains("3-large") { 3072 } else { 1536 };

        info!(model, dimensions, "Created OpenAI embedding provider");
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl EmbeddingService for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(PrismError::Embedding("cannot embed empty text".to_string()));
        }

        let url = format!("{}/embeddings", self.api_base);
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            encoding_format: "float",
        };

        debug!(text_len = text.len(), "Requesting embedding");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PrismError::Embedding(format!("embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PrismError::Embedding(format!(
                "embedding API returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PrismError::Embedding(format!("parse embedding response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| PrismError::Embedding("embedding response had no data".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic bag-of-words vectors
// ---------------------------------------------------------------------------

const MOCK_DIMENSIONS: usize = 4096;

/// Deterministic offline embedding.
///
/// Each stemmed token hashes into two buckets of a fixed-size vector; the
/// result is L2-normalized. Identical texts embed identically, and texts
/// sharing tokens ("mountains" / "mountain lake") land measurably closer
/// than unrelated texts.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn bag_of_words(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; MOCK_DIMENSIONS];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let stemmed = stem(&token.to_lowercase());
            // Two buckets per token: a single accidental bucket collision
            // between unrelated vocabularies cannot outweigh a real shared token.
            for seed in 0u64..2 {
                let mut hasher = DefaultHasher::new();
                seed.hash(&mut hasher);
                stemmed.hash(&mut hasher);
                let bucket = (hasher.finish() % MOCK_DIMENSIONS as u64) as usize;
                vector[bucket] += 1.0;
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

/// Minimal plural folding so "mountains" and "mountain" share a bucket.
fn stem(token: &str) -> String {
    if token.len() > 3 {
        token.strip_suffix('s').unwrap_or(token).to_string()
    } else {
        token.to_string()
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(PrismError::Embedding("cannot embed empty text".to_string()));
        }
        Ok(Self::bag_of_words(text))
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
        let ma: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        let mb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        if ma == 0.0 || mb == 0.0 {
            0.0
        } else {
            dot / (ma * mb)
        }
    }

    #[tokio::test]
    async fn test_mock_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), MOCK_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_mock_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_identical_text_full_similarity() {
        let service = MockEmbedding::new();
        let v1 = service.embed("a serene mountain lake").await.unwrap();
        let v2 = service.embed("a serene mountain lake").await.unwrap();
        assert!((cosine(&v1, &v2) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_mock_shared_vocabulary_scores_higher() {
        let service = MockEmbedding::new();
        let query = service.embed("calm water near mountains").await.unwrap();
        let lake = service.embed("a serene mountain lake").await.unwrap();
        let desert = service.embed("a busy desert storm").await.unwrap();

        // "mountains" stems to "mountain", shared with the lake photo.
        assert!(cosine(&query, &lake) > cosine(&query, &desert));
    }

    #[tokio::test]
    async fn test_mock_empty_text_errors() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_is_normalized() {
        let service = MockEmbedding::new();
        let vec = service.embed("normalize me please").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stem_folds_plurals_only_on_longer_tokens() {
        assert_eq!(stem("mountains"), "mountain");
        assert_eq!(stem("lakes"), "lake");
        // Short tokens are left alone so "is"/"as" don't merge with "i"/"a".
        assert_eq!(stem("is"), "is");
        assert_eq!(stem("gas"), "gas");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let result = OpenAiEmbedding::new("https://api.openai.com/v1", "", "text-embedding-3-small");
        assert!(result.is_err());
    }

    #[test]
    fn test_openai_dimensions_by_model() {
        let small =
            OpenAiEmbedding::new("https://api.openai.com/v1", "key", "text-embedding-3-small")
                .unwrap();
        assert_eq!(EmbeddingService::dimensions(&small), 1536);

        let large =
            OpenAiEmbedding::new("https://api.openai.com/v1", "key", "text-embedding-3-large")
                .unwrap();
        assert_eq!(EmbeddingService::dimensions(&large), 3072);
    }

    #[test]
    fn test_embedding_response_deserialization() {
        let json = r#"{
            "object": "list",
            "data": [{"object": "embedding", "embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        }"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_dyn_wrapper_dispatches() {
        let service: Box<dyn DynEmbeddingService> = Box::new(MockEmbedding::new());
        let vec = service.embed_boxed("dispatch test").await.unwrap();
        assert_eq!(vec.len(), service.dimensions());
    }
}
