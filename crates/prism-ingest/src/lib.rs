//! Prism ingestion: extraction capability seam and the ingestion pipeline.
//!
//! Turns raw photo descriptions into a validated graph fragment plus an
//! embedding-index entry, with full-rebuild and incremental-add flows.

pub mod extract;
pub mod pipeline;

pub use extract::{Extraction, GraphExtractor, KeywordExtractor, OpenAiExtractor};
pub use pipeline::{
    AddReport, DocumentOutcome, FailureStage, IngestionPipeline, OutcomeStatus, RebuildReport,
};
