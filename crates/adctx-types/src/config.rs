//! Configuration structs. Every section defaults, so an empty or missing
//! config file yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdctxConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub storage: StorageConfig,
    pub embedding: EmbeddingSettings,
    pub search: SearchConfig,
    pub autosave: AutosaveConfig,
    pub ingest: IngestConfig,
    pub training: TrainingConfig,
}

impl Default for AdctxConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            storage: StorageConfig::default(),
            embedding: EmbeddingSettings::default(),
            search: SearchConfig::default(),
            autosave: AutosaveConfig::default(),
            ingest: IngestConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

/// Durable log location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path. `None` resolves to `~/.adctx/data.db`.
    pub db_path: Option<PathBuf>,
}

/// Which embedding function answers `embed` calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `hashing` (local, deterministic) or an OpenAI-compatible provider
    /// name (`openai`, `ollama`, `groq`, ...).
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key. Empty for local providers.
    pub api_key_env: String,
    /// Override for the provider's base URL.
    pub base_url: Option<String>,
    /// Output dimension of the hashing driver.
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            api_key_env: String::new(),
            base_url: None,
            dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Upper bound on `k` accepted by search.
    pub max_top_k: usize,
    pub default_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_top_k: 20,
            default_top_k: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Memorize each search query as an `auto_query` chunk.
    pub enabled: bool,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Drop noisy lines from ingested text before embedding.
    pub filter_noise: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub default_batch_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 128,
        }
    }
}
