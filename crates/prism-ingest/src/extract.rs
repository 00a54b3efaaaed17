//! Entity/relationship extraction capability.
//!
//! The extraction model is external; this module defines the seam and two
//! implementations:
//! - `OpenAiExtractor` prompts a chat model with the schema vocabulary
//!   attached as a constraint and strict-parses its JSON reply.
//! - `KeywordExtractor` recognizes photo-domain terms from a fixed lexicon,
//!   emitting one typed node per term and co-occurrence edges between
//!   adjacent terms. Deterministic; used offline and in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use prism_core::error::{PrismError, Result};
use prism_core::schema::SchemaVocabulary;
use prism_core::types::{Document, GraphEdge, GraphNode};

/// The raw output of the extraction capability for one document, prior to
/// schema validation.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Capability contract: text plus vocabulary in, graph fragment out.
#[async_trait]
pub trait GraphExtractor: Send + Sync {
    async fn extract(
        &self,
        document: &Document,
        vocabulary: &SchemaVocabulary,
    ) -> Result<Extraction>;
}

// ---------------------------------------------------------------------------
// KeywordExtractor - offline lexicon extraction
// ---------------------------------------------------------------------------

/// Photo-domain lexicon mapping surface terms to entity types.
const LEXICON: &[(&str, &str)] = &[
    // Natural features
    ("mountain", "NaturalFeature"),
    ("lake", "NaturalFeature"),
    ("river", "NaturalFeature"),
    ("waterfall", "NaturalFeature"),
    ("tree", "NaturalFeature"),
    ("forest", "NaturalFeature"),
    ("water", "NaturalFeature"),
    ("wave", "NaturalFeature"),
    ("cliff", "NaturalFeature"),
    ("flower", "NaturalFeature"),
    // Landscapes
    ("beach", "Landscape"),
    ("desert", "Landscape"),
    ("valley", "Landscape"),
    ("meadow", "Landscape"),
    ("coastline", "Landscape"),
    ("hillside", "Landscape"),
    // Weather
    ("storm", "Weather"),
    ("rain", "Weather"),
    ("snow", "Weather"),
    ("fog", "Weather"),
    ("cloud", "Weather"),
    ("wind", "Weather"),
    // Time context
    ("sunset", "TimeContext"),
    ("sunrise", "TimeContext"),
    ("night", "TimeContext"),
    ("morning", "TimeContext"),
    ("evening", "TimeContext"),
    ("dusk", "TimeContext"),
    // People
    ("person", "Person"),
    ("man", "Person"),
    ("woman", "Person"),
    ("child", "Person"),
    ("family", "Person"),
    ("crowd", "Person"),
    // Buildings
    ("house", "Building"),
    ("church", "Building"),
    ("tower", "Building"),
    ("bridge", "Building"),
    ("castle", "Building"),
    ("cabin", "Building"),
    // Activities
    ("hiking", "Activity"),
    ("swimming", "Activity"),
    ("dancing", "Activity"),
    ("fishing", "Activity"),
    ("surfing", "Activity"),
    ("picnic", "Activity"),
    // Atmosphere
    ("serene", "Atmosphere"),
    ("calm", "Atmosphere"),
    ("busy", "Atmosphere"),
    ("peaceful", "Atmosphere"),
    ("dramatic", "Atmosphere"),
    ("cozy", "Atmosphere"),
    // Locations
    ("city", "Location"),
    ("village", "Location"),
    ("park", "Location"),
    ("harbor", "Location"),
    ("street", "Location"),
    // Objects
    ("boat", "Object"),
    ("car", "Object"),
    ("bicycle", "Object"),
    ("umbrella", "Object"),
    ("dog", "Object"),
    ("table", "Object"),
];

/// Deterministic lexicon-based extractor.
///
/// Emits one node per recognized term (deduplicated per document) and a
/// NEXT_TO co-occurrence edge between each pair of adjacent recognized terms.
#[derive(Debug, Clone, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    fn lookup(term: &str) -> Option<&'static str> {
        let folded = if term.len() > 3 {
            term.strip_suffix('s').unwrap_or(term)
        } else {
            term
        };
        LEXICON
            .iter()
            .find(|(word, _)| *word == folded)
            .map(|(_, node_type)| *node_type)
    }
}

#[async_trait]
impl GraphExtractor for KeywordExtractor {
    async fn extract(
        &self,
        document: &Document,
        _vocabulary: &SchemaVocabulary,
    ) -> Result<Extraction> {
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut recognized_order: Vec<String> = Vec::new();

        for token in document
            .text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lower = token.to_lowercase();
            let Some(node_type) = Self::lookup(&lower) else {
                continue;
            };
            let id = lower
                .strip_suffix('s')
                .filter(|_| lower.len() > 3)
                .unwrap_or(&lower)
                .to_string();

            if !nodes.iter().any(|n: &GraphNode| n.id == id) {
                nodes.push(
                    GraphNode::new(&id, node_type, &document.filename)
                        .with_property("description", &lower),
                );
            }
            if recognized_order.last() != Some(&id) {
                recognized_order.push(id);
            }
        }

        let edges = recognized_order
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .map(|pair| GraphEdge::new("NEXT_TO", &pair[0], &pair[1]))
            .collect();

        debug!(
            filename = %document.filename,
            entities = nodes.len(),
            "Lexicon extraction complete"
        );

        Ok(Extraction { nodes, edges })
    }
}

// ---------------------------------------------------------------------------
// OpenAiExtractor - LLM extraction over HTTP
// ---------------------------------------------------------------------------

/// Extractor backed by an OpenAI-compatible chat completion endpoint.
///
/// The vocabulary is embedded in the prompt as the constraint set; the model
/// replies with a JSON graph fragment which is strict-parsed. Transport or
/// parse failure surfaces as [`PrismError::Extraction`].
pub struct OpenAiExtractor {
    client: reqwest::Client,
    api_base: String,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(PrismError::Config(
                "extraction capability requires an API key".to_string(),
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

        info!(model, "Created OpenAI extraction provider");
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn prompt(document: &Document, vocabulary: &SchemaVocabulary) -> String {
        let list = |set: &std::collections::BTreeSet<String>| {
            set.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        format!(
            "Extract entities and relationships from the photo description below.\n\
             Allowed node types: {}\n\
             Allowed relationship types: {}\n\
             Allowed node properties: {}\n\
             Allowed relationship properties: {}\n\
             Use only the allowed vocabulary. Reply with JSON only, shaped as\n\
             {{\"nodes\": [{{\"id\": \"...\", \"type\": \"...\", \"properties\": {{}}}}],\n\
              \"edges\": [{{\"type\": \"...\", \"from\": \"...\", \"to\": \"...\", \"properties\": {{}}}}]}}\n\n\
             Description: {}",
            list(&vocabulary.allowed_node_types),
            list(&vocabulary.allowed_relationship_types),
            list(&vocabulary.node_properties),
            list(&vocabulary.relationship_properties),
            document.text
        )
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

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    nodes: Vec<NodeReply>,
    #[serde(default)]
    edges: Vec<EdgeReply>,
}

#[derive(Debug, Deserialize)]
struct NodeReply {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    properties: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct EdgeReply {
    #[serde(rename = "type")]
    edge_type: String,
    from: String,
    to: String,
    #[serde(default)]
    properties: std::collections::BTreeMap<String, String>,
}

/// Strip optional markdown code fences from a model reply.
fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

/// Parse a model reply into an extraction tagged with its source document.
fn parse_extraction_reply(reply: &str, filename: &str) -> Result<Extraction> {
    let parsed: ExtractionReply = serde_json::from_str(strip_fences(reply))
        .map_err(|e| PrismError::Extraction(format!("unparseable extraction reply: {}", e)))?;

    let nodes = parsed
        .nodes
        .into_iter()
        .map(|n| GraphNode {
            id: n.id,
            node_type: n.node_type,
            properties: n.properties,
            source: filename.to_string(),
        })
        .collect();

    let edges = parsed
        .edges
        .into_iter()
        .map(|e| GraphEdge {
            edge_type: e.edge_type,
            from: e.from,
            to: e.to,
            properties: e.properties,
        })
        .collect();

    Ok(Extraction { nodes, edges })
}

#[async_trait]
impl GraphExtractor for OpenAiExtractor {
    async fn extract(
        &self,
        document: &Document,
        vocabulary: &SchemaVocabulary,
    ) -> Result<Extraction> {
        let url = format!("{}/chat/completions", self.api_base);
        let prompt = Self::prompt(document, vocabulary);
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
            .map_err(|e| PrismError::Extraction(format!("extraction request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PrismError::Extraction(format!(
                "extraction API returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PrismError::Extraction(format!("parse chat response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PrismError::Extraction("chat response had no choices".to_string()))?;

        parse_extraction_reply(&content, &document.filename)
    }
}
