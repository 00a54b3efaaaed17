use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PrismError, Result};

/// Top-level configuration for the Prism service.
///
/// Loaded from a TOML file with per-section defaults, then overlaid once at
/// startup with environment variables. Never re-read per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrismConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub capability: CapabilityConfig,
}

impl PrismConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PrismConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PrismError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay environment variables onto this configuration.
    ///
    /// Called once at startup. Unparseable values are warned about and
    /// ignored rather than aborting boot.
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PRISM_PORT") {
            match port.parse() {
                Ok(p) => self.general.port = p,
                Err(_) => warn!(value = %port, "Ignoring unparseable PRISM_PORT"),
            }
        }
        if let Ok(path) = std::env::var("PRISM_GRAPH_DB") {
            self.graph.db_path = path;
        }
        if let Ok(ms) = std::env::var("PRISM_CHANNEL_TIMEOUT_MS") {
            match ms.parse() {
                Ok(v) => self.retrieval.channel_timeout_ms = v,
                Err(_) => warn!(value = %ms, "Ignoring unparseable PRISM_CHANNEL_TIMEOUT_MS"),
            }
        }
        if let Ok(v) = std::env::var("PRISM_REQUIRE_BOTH_CHANNELS") {
            self.retrieval.require_both_channels = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.capability.api_key = Some(key);
            }
        }
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            self.capability.api_base = base;
        }
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// API server port.
    pub port: u16,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Data directory for the graph database file.
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            port: 7500,
            log_level: "info".to_string(),
            data_dir: "~/.prism/data".to_string(),
        }
    }
}

/// Graph store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Path to the SQLite graph database. `:memory:` for an ephemeral store.
    pub db_path: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.prism/data/graph.db".to_string(),
        }
    }
}

/// Query-time retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Vector channel top-k.
    pub vector_top_k: usize,
    /// Graph channel distinct-filename limit.
    pub graph_limit: usize,
    /// Per-channel deadline in milliseconds.
    pub channel_timeout_ms: u64,
    /// Fail-fast mode: any single channel failure aborts the query.
    pub require_both_channels: bool,
}

impl RetrievalConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 3,
            graph_limit: 3,
            channel_timeout_ms: 10_000,
            require_both_channels: false,
        }
    }
}

/// Credentials and model names for the external capabilities
/// (extraction, embedding, ranking).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// API key. When absent the service falls back to the offline
    /// deterministic implementations.
    pub api_key: Option<String>,
    /// Chat model used for extraction and ranking.
    pub chat_model: String,
    /// Embedding model.
    pub embedding_model: String,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PrismConfig::default();
        assert_eq!(config.general.port, 7500);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.retrieval.vector_top_k, 3);
        assert_eq!(config.retrieval.graph_limit, 3);
        assert_eq!(config.retrieval.channel_timeout_ms, 10_000);
        assert!(!config.retrieval.require_both_channels);
        assert_eq!(config.capability.chat_model, "gpt-4o-mini");
        assert!(config.capability.api_key.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
port = 8080
log_level = "debug"

[graph]
db_path = "/tmp/prism-test.db"

[retrieval]
vector_top_k = 5
graph_limit = 4
channel_timeout_ms = 2500
require_both_channels = true

[capability]
api_base = "http://localhost:11434/v1"
chat_model = "local-model"
embedding_model = "local-embed"
"#;
        let file = create_temp_config(content);
        let config = PrismConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.graph.db_path, "/tmp/prism-test.db");
        assert_eq!(config.retrieval.vector_top_k, 5);
        assert_eq!(config.retrieval.graph_limit, 4);
        assert!(config.retrieval.require_both_channels);
        assert_eq!(config.capability.api_base, "http://localhost:11434/v1");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[retrieval]
vector_top_k = 10
"#;
        let file = create_temp_config(content);
        let config = PrismConfig::load(file.path()).unwrap();
        assert_eq!(config.retrieval.vector_top_k, 10);
        assert_eq!(config.retrieval.graph_limit, 3);
        assert_eq!(config.general.port, 7500);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PrismConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.port, 7500);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(PrismConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let config = PrismConfig::default();
        config.save(&path).unwrap();

        let reloaded = PrismConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.port, config.general.port);
        assert_eq!(
            reloaded.retrieval.channel_timeout_ms,
            config.retrieval.channel_timeout_ms
        );
    }

    #[test]
    fn test_channel_timeout_duration() {
        let retrieval = RetrievalConfig {
            channel_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(retrieval.channel_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = PrismConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "~/.prism/data");
        assert_eq!(config.capability.embedding_model, "text-embedding-3-small");
    }
}
