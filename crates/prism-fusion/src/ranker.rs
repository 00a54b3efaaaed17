//! Answer ranking capability seam.
//!
//! The ranker receives the fused context and the original query and returns
//! the final natural-language answer. Its output is returned to the caller
//! verbatim.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use prism_core::error::{PrismError, Result};

/// Capability contract: fused context plus query in, answer text out.
#[async_trait]
pub trait AnswerRanker: Send + Sync {
    async fn rank(&self, context: &str, query: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// FirstPhotoRanker - deterministic offline ranker
// ---------------------------------------------------------------------------

/// Deterministic offline ranker: answers with the first photo of the vector
/// block (the highest-similarity candidate), mirroring the answer shape of
/// the model-backed ranker.
#[derive(Debug, Clone, Default)]
pub struct FirstPhotoRanker;

impl FirstPhotoRanker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnswerRanker for FirstPhotoRanker {
    async fn rank(&self, context: &str, _query: &str) -> Result<String> {
        let filename = context.lines().find_map(|line| {
            let rest = line.strip_prefix("Photo ")?;
            let (filename, _) = rest.split_once(':')?;
            Some(filename.trim().to_string())
        });

        Ok(match filename {
            Some(filename) => format!("Filename: {}", filename),
            None => "No matching photo found.".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// OpenAiRanker - LLM ranking over HTTP
// ---------------------------------------------------------------------------

/// Instructions handed to the ranking model along with the fused context.
const RANKING_TEMPLATE: &str = "\
Given the following structured and unstructured search results about photos,
analyze both the direct content and the relationships between elements to
find the most relevant photo.

Consider these aspects when matching:
1. Primary elements and objects in the scene
2. Atmosphere and mood
3. Activities and interactions
4. Time of day and lighting
5. Spatial relationships and scene composition
6. Weather and environmental conditions
7. Overall scene type and setting

Context:
{context}

Query: {query}

Provide your response in this format:
Filename: <chosen_filename>
Primary Match Factors:
- [List 2-3 key elements that strongly match the query]
Detailed Reasoning: [Explain how the photo's elements, relationships, and atmosphere align with the query]
Alternative Considerations: [Briefly mention why this photo was chosen over other potential matches]";

/// Ranker backed by an OpenAI-compatible chat completion endpoint.
pub struct OpenAiRanker {
    client: reqwest::Client,
    api_base: String,
    model: String,
}

impl OpenAiRanker {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(PrismError::Config(
                "ranking capability requires an API key".to_string(),
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
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|e| PrismError::Config(format!("build HTTP client: {}", e)))?;

        info!(model, "Created OpenAI ranking provider");
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn prompt(context: &str, query: &str) -> String {
        RANKING_TEMPLATE
            .replace("{context}", context)
            .replace("{query}", query)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

#[async_trait]
impl AnswerRanker for OpenAiRanker {
    async fn rank(&self, context: &str, query: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let prompt = Self::prompt(context, query);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PrismError::Ranking(format!("ranking request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PrismError::Ranking(format!(
                "ranking API returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PrismError::Ranking(format!("parse chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PrismError::Ranking("chat response had no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_photo_ranker_picks_first_vector_hit() {
        let context = "Vector Search Results:\n\
                       Photo a.jpg: a serene mountain lake\n\
                       Photo b.jpg: a busy desert storm\n\
                       \n\
                       Graph Search Results:\n\
                       Photo c.jpg: something else\n";
        let answer = FirstPhotoRanker::new().rank(context, "query").await.unwrap();
        assert_eq!(answer, "Filename: a.jpg");
    }

    #[tokio::test]
    async fn test_first_photo_ranker_falls_back_to_graph_block() {
        let context = "Vector Search Results:\n\
                       \n\
                       Graph Search Results:\n\
                       Photo g.jpg: graph only\n";
        let answer = FirstPhotoRanker::new().rank(context, "query").await.unwrap();
        assert_eq!(answer, "Filename: g.jpg");
    }

    #[tokio::test]
    async fn test_first_photo_ranker_empty_context() {
        let context = "Vector Search Results:\n\nGraph Search Results:\n";
        let answer = FirstPhotoRanker::new().rank(context, "query").await.unwrap();
        assert_eq!(answer, "No matching photo found.");
    }

    #[test]
    fn test_openai_ranker_requires_api_key() {
        assert!(OpenAiRanker::new("https://api.openai.com/v1", "", "gpt-4o-mini").is_err());
    }

    #[test]
    fn test_prompt_substitutes_context_and_query() {
        let prompt = OpenAiRanker::prompt("THE CONTEXT", "THE QUERY");
        assert!(prompt.contains("THE CONTEXT"));
        assert!(prompt.contains("Query: THE QUERY"));
        assert!(prompt.contains("Filename: <chosen_filename>"));
        assert!(!prompt.contains("{context}"));
    }
}
