//! Prism query fusion: dual-channel retrieval, candidate fusion, and answer
//! orchestration.
//!
//! The fusion engine runs the vector and graph channels concurrently, merges
//! their results into one deduplicated candidate set with per-channel
//! evidence, and renders a deterministic textual context for the downstream
//! ranking capability.

pub mod engine;
pub mod orchestrator;
pub mod ranker;

pub use engine::{FusedContext, FusionEngine, FusionOptions};
pub use orchestrator::{Answer, AnswerOrchestrator};
pub use ranker::{AnswerRanker, FirstPhotoRanker, OpenAiRanker};
