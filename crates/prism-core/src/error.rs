use thiserror::Error;

/// Top-level error type for the Prism system.
///
/// Each variant corresponds to one failure kind in the ingestion/retrieval
/// taxonomy. Subsystem crates construct these directly so the `?` operator
/// works across crate boundaries without per-crate error types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrismError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An extracted node or edge fell outside the allowed vocabulary.
    /// Non-fatal during ingestion: the entity is dropped and the batch
    /// continues.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Drop-index was called on an index that does not exist. Expected and
    /// tolerated during a reset; any other store error is re-raised.
    #[error("Index does not exist: {0}")]
    IndexMissing(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Ranking error: {0}")]
    Ranking(String),

    /// One channel of an incremental add committed while the other failed.
    /// Surfaced verbatim so the caller can retry the missing half.
    #[error(
        "Partial write for {filename}: graph committed: {graph_committed}, \
         vector committed: {vector_committed}"
    )]
    PartialWrite {
        filename: String,
        graph_committed: bool,
        vector_committed: bool,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Retrieval channel timed out: {0}")]
    ChannelTimeout(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for PrismError {
    fn from(err: toml::de::Error) -> Self {
        PrismError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PrismError {
    fn from(err: serde_json::Error) -> Self {
        PrismError::Serialization(err.to_string())
    }
}

impl PrismError {
    /// True for the error kinds that abort the whole operation rather than
    /// degrading it (store connectivity loss, both channels timing out).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PrismError::StoreUnavailable(_) | PrismError::ChannelTimeout(_)
        )
    }
}

/// A specialized `Result` type for Prism operations.
pub type Result<T> = std::result::Result<T, PrismError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrismError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_partial_write_display_names_both_halves() {
        let err = PrismError::PartialWrite {
            filename: "a.jpg".to_string(),
            graph_committed: true,
            vector_committed: false,
        };
        let msg = err.to_string();
        assert!(msg.contains("a.jpg"));
        assert!(msg.contains("graph committed: true"));
        assert!(msg.contains("vector committed: false"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PrismError = io_err.into();
        assert!(matches!(err, PrismError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_converts_to_config() {
        let bad: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: PrismError = bad.unwrap_err().into();
        assert!(matches!(err, PrismError::Config(_)));
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let bad: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{ not json }");
        let err: PrismError = bad.unwrap_err().into();
        assert!(matches!(err, PrismError::Serialization(_)));
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(PrismError::StoreUnavailable("down".into()).is_fatal());
        assert!(PrismError::ChannelTimeout("both".into()).is_fatal());
        assert!(!PrismError::SchemaViolation("x".into()).is_fatal());
        assert!(!PrismError::IndexMissing("photo_keywords".into()).is_fatal());
        assert!(!PrismError::Extraction("x".into()).is_fatal());
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(7);
            let _value = io_result?;
            Ok("ok".to_string())
        }
        assert_eq!(inner().unwrap(), "ok");
    }
}
