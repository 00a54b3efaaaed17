//! Closed vocabulary constraining extraction output.
//!
//! The registry is built once at process start and never mutated. Entities
//! outside the vocabulary are dropped from the ingestion batch, never
//! inserted; a single malformed entity must not abort the batch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PrismError, Result};
use crate::types::{GraphEdge, GraphNode};

/// The closed set of entity types, relationship types, and property keys an
/// extraction result may use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVocabulary {
    pub allowed_node_types: BTreeSet<String>,
    pub allowed_relationship_types: BTreeSet<String>,
    pub node_properties: BTreeSet<String>,
    pub relationship_properties: BTreeSet<String>,
}

impl SchemaVocabulary {
    /// Build a vocabulary from explicit sets, validating once at construction.
    ///
    /// Every set must be non-empty: an empty vocabulary would silently drop
    /// all extraction output.
    pub fn new(
        node_types: impl IntoIterator<Item = impl Into<String>>,
        relationship_types: impl IntoIterator<Item = impl Into<String>>,
        node_properties: impl IntoIterator<Item = impl Into<String>>,
        relationship_properties: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let vocab = Self {
            allowed_node_types: node_types.into_iter().map(Into::into).collect(),
            allowed_relationship_types: relationship_types.into_iter().map(Into::into).collect(),
            node_properties: node_properties.into_iter().map(Into::into).collect(),
            relationship_properties: relationship_properties
                .into_iter()
                .map(Into::into)
                .collect(),
        };

        for (name, set) in [
            ("allowed_node_types", &vocab.allowed_node_types),
            (
                "allowed_relationship_types",
                &vocab.allowed_relationship_types,
            ),
            ("node_properties", &vocab.node_properties),
            ("relationship_properties", &vocab.relationship_properties),
        ] {
            if set.is_empty() {
                return Err(PrismError::Config(format!(
                    "schema vocabulary set '{}' must not be empty",
                    name
                )));
            }
        }

        Ok(vocab)
    }

    /// The photo-description vocabulary this service ships with.
    pub fn photo() -> Self {
        Self::new(
            [
                "Scene",
                "Landscape",
                "Building",
                "Person",
                "Activity",
                "NaturalFeature",
                "TimeContext",
                "Atmosphere",
                "Object",
                "Weather",
                "Location",
            ],
            [
                "CONTAINS",
                "HAS_FEATURE",
                "LOCATED_IN",
                "NEXT_TO",
                "PART_OF",
                "INTERACTS_WITH",
                "CREATES",
                "INFLUENCES",
                "USED_IN",
                "EXPERIENCES",
            ],
            [
                "type",
                "description",
                "color",
                "atmosphere",
                "time_of_day",
                "weather",
                "activity_level",
                "importance",
            ],
            ["description", "spatial", "temporal", "impact", "strength"],
        )
        .expect("built-in photo vocabulary is non-empty")
    }

    /// Validate a node against the vocabulary.
    ///
    /// Returns `SchemaViolation` naming the unknown type or property key.
    pub fn validate_node(&self, node: &GraphNode) -> Result<()> {
        if !self.allowed_node_types.contains(&node.node_type) {
            return Err(PrismError::SchemaViolation(format!(
                "node '{}' has unknown type '{}'",
                node.id, node.node_type
            )));
        }
        for key in node.properties.keys() {
            if !self.node_properties.contains(key) {
                return Err(PrismError::SchemaViolation(format!(
                    "node '{}' has unknown property '{}'",
                    node.id, key
                )));
            }
        }
        Ok(())
    }

    /// Validate an edge against the vocabulary.
    pub fn validate_edge(&self, edge: &GraphEdge) -> Result<()> {
        if !self.allowed_relationship_types.contains(&edge.edge_type) {
            return Err(PrismError::SchemaViolation(format!(
                "edge {} -> {} has unknown type '{}'",
                edge.from, edge.to, edge.edge_type
            )));
        }
        for key in edge.properties.keys() {
            if !self.relationship_properties.contains(key) {
                return Err(PrismError::SchemaViolation(format!(
                    "edge {} -> {} has unknown property '{}'",
                    edge.from, edge.to, key
                )));
            }
        }
        Ok(())
    }
}

impl Default for SchemaVocabulary {
    fn default() -> Self {
        Self::photo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_vocabulary_contents() {
        let vocab = SchemaVocabulary::photo();
        assert!(vocab.allowed_node_types.contains("NaturalFeature"));
        assert!(vocab.allowed_node_types.contains("Weather"));
        assert!(vocab.allowed_relationship_types.contains("NEXT_TO"));
        assert!(vocab.node_properties.contains("time_of_day"));
        assert!(vocab.relationship_properties.contains("spatial"));
        assert_eq!(vocab.allowed_node_types.len(), 11);
        assert_eq!(vocab.allowed_relationship_types.len(), 10);
    }

    #[test]
    fn test_valid_node_passes() {
        let vocab = SchemaVocabulary::photo();
        let node = GraphNode::new("lake", "NaturalFeature", "a.jpg")
            .with_property("description", "still water");
        assert!(vocab.validate_node(&node).is_ok());
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let vocab = SchemaVocabulary::photo();
        let node = GraphNode::new("x", "Spaceship", "a.jpg");
        let err = vocab.validate_node(&node).unwrap_err();
        assert!(matches!(err, PrismError::SchemaViolation(_)));
        assert!(err.to_string().contains("Spaceship"));
    }

    #[test]
    fn test_unknown_node_property_rejected() {
        let vocab = SchemaVocabulary::photo();
        let node =
            GraphNode::new("lake", "NaturalFeature", "a.jpg").with_property("altitude", "high");
        let err = vocab.validate_node(&node).unwrap_err();
        assert!(err.to_string().contains("altitude"));
    }

    #[test]
    fn test_valid_edge_passes() {
        let vocab = SchemaVocabulary::photo();
        let edge = GraphEdge::new("NEXT_TO", "lake", "mountain").with_property("spatial", "west");
        assert!(vocab.validate_edge(&edge).is_ok());
    }

    #[test]
    fn test_unknown_edge_type_rejected() {
        let vocab = SchemaVocabulary::photo();
        let edge = GraphEdge::new("ORBITS", "a", "b");
        assert!(vocab.validate_edge(&edge).is_err());
    }

    #[test]
    fn test_unknown_edge_property_rejected() {
        let vocab = SchemaVocabulary::photo();
        let edge = GraphEdge::new("CONTAINS", "a", "b").with_property("velocity", "fast");
        let err = vocab.validate_edge(&edge).unwrap_err();
        assert!(err.to_string().contains("velocity"));
    }

    #[test]
    fn test_mentions_is_not_in_extraction_vocabulary() {
        // MENTIONS is the reserved document-to-entity link the pipeline emits;
        // the extractor may not produce it.
        let vocab = SchemaVocabulary::photo();
        let edge = GraphEdge::new(crate::types::MENTIONS_RELATIONSHIP, "a.jpg", "lake");
        assert!(vocab.validate_edge(&edge).is_err());
    }

    #[test]
    fn test_document_label_is_reserved_not_extractable() {
        // Document nodes are created by the pipeline, never by extraction.
        let vocab = SchemaVocabulary::photo();
        assert!(!vocab
            .allowed_node_types
            .contains(crate::types::DOCUMENT_LABEL));
    }

    #[test]
    fn test_empty_set_rejected_at_construction() {
        let result = SchemaVocabulary::new(
            Vec::<String>::new(),
            vec!["CONTAINS".to_string()],
            vec!["description".to_string()],
            vec!["description".to_string()],
        );
        assert!(matches!(result, Err(PrismError::Config(_))));
    }
}
