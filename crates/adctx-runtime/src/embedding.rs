//! Embedding drivers for vector-based semantic memory.
//!
//! Provides an `EmbeddingDriver` trait with two implementations:
//! - `OpenAIEmbeddingDriver`: any provider offering a `/v1/embeddings`
//!   endpoint (OpenAI, Groq, Together, Fireworks, Ollama, vLLM, ...).
//! - `HashingEmbeddingDriver`: deterministic signed feature hashing of word
//!   unigrams and bigrams. Needs no network or model files.
//!
//! Drivers return raw vectors; normalization is the memory engine's job.

use adctx_types::config::EmbeddingSettings;
use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";
const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const VLLM_BASE_URL: &str = "http://localhost:8000/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing API key: {0}")]
    MissingApiKey(String),
    #[error("Invalid embedding config: {0}")]
    InvalidConfig(String),
}

/// Resolved configuration for an HTTP embedding driver.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Provider name (openai, groq, together, ollama, etc.).
    pub provider: String,
    /// Model name (e.g., "text-embedding-3-small", "all-MiniLM-L6-v2").
    pub model: String,
    /// API key (resolved from env var).
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
}

/// Trait for computing text embeddings.
///
/// Implementations must be deterministic for a given loaded model and safe
/// to call concurrently.
#[async_trait]
pub trait EmbeddingDriver: Send + Sync {
    /// Compute embedding vectors for a batch of texts.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Compute embedding for a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let results = self.embed(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Parse("Empty embedding response".to_string()))
    }

    /// Return the dimensionality of embeddings produced by this driver.
    fn dimensions(&self) -> usize;

    /// Identifier of the loaded model, e.g. `openai/text-embedding-3-small`.
    fn model_id(&self) -> String;
}

/// OpenAI-compatible embedding driver.
pub struct OpenAIEmbeddingDriver {
    api_key: Zeroizing<String>,
    base_url: String,
    provider: String,
    model: String,
    client: reqwest::Client,
    dims: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl OpenAIEmbeddingDriver {
    /// Create a new OpenAI-compatible embedding driver.
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        if config.model.is_empty() {
            return Err(EmbeddingError::InvalidConfig(
                "model name must not be empty".to_string(),
            ));
        }
        let dims = infer_dimensions(&config.model);

        Ok(Self {
            api_key: Zeroizing::new(config.api_key),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            provider: config.provider,
            model: config.model,
            client: reqwest::Client::new(),
            dims,
        })
    }
}

/// Infer embedding dimensions from model name.
fn infer_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        "all-MiniLM-L6-v2" => 384,
        "all-MiniLM-L12-v2" => 384,
        "all-mpnet-base-v2" => 768,
        "nomic-embed-text" => 768,
        "mxbai-embed-large" => 1024,
        _ => 1536,
    }
}

#[async_trait]
impl EmbeddingDriver for OpenAIEmbeddingDriver {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut req = self.client.post(&url).json(&body);
        if !self.api_key.as_str().is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key.as_str()));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;
        let status = resp.status().as_u16();

        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status,
                message: body_text,
            });
        }

        let data: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        let embeddings: Vec<Vec<f32>> = data.data.into_iter().map(|d| d.embedding).collect();
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        debug!(
            "Embedded {} texts (dims={})",
            embeddings.len(),
            embeddings.first().map(|e| e.len()).unwrap_or(0)
        );

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Weight of a bigram feature relative to a unigram.
const BIGRAM_WEIGHT: f32 = 0.5;

/// Local deterministic embedding driver based on signed feature hashing.
///
/// Each lowercase word and each adjacent word pair is hashed (SHA-256,
/// salted with the model name) into one of `dims` buckets with a +/-1 sign.
/// Identical texts always produce identical vectors; texts sharing words
/// produce overlapping vectors.
pub struct HashingEmbeddingDriver {
    model: String,
    dims: usize,
    token_re: Regex,
}

impl HashingEmbeddingDriver {
    pub fn new(model: &str, dims: usize) -> Result<Self, EmbeddingError> {
        if dims == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "hashing driver needs at least one dimension".to_string(),
            ));
        }
        let token_re =
            Regex::new(r"\w+").map_err(|e| EmbeddingError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            model: model.to_string(),
            dims,
            token_re,
        })
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(word);
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        ((h % self.dims as u64) as usize, sign)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let tokens: Vec<String> = self
            .token_re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        if tokens.is_empty() {
            // Punctuation-only text still needs a non-zero vector.
            let (idx, sign) = self.bucket(text.trim());
            vec[idx] += sign;
            return vec;
        }

        for token in &tokens {
            let (idx, sign) = self.bucket(token);
            vec[idx] += sign;
        }
        for pair in tokens.windows(2) {
            let (idx, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vec[idx] += sign * BIGRAM_WEIGHT;
        }
        vec
    }
}

#[async_trait]
impl EmbeddingDriver for HashingEmbeddingDriver {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> String {
        format!("hashing/{}-{}", self.model, self.dims)
    }
}

/// Create an embedding driver from embedding settings.
pub fn create_embedding_driver(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingDriver>, EmbeddingError> {
    if settings.provider == "hashing" {
        let driver = HashingEmbeddingDriver::new(&settings.model, settings.dimensions)?;
        return Ok(Arc::new(driver));
    }

    let api_key = if settings.api_key_env.is_empty() {
        String::new()
    } else {
        std::env::var(&settings.api_key_env)
            .map_err(|_| EmbeddingError::MissingApiKey(settings.api_key_env.clone()))?
    };

    let base_url = match (settings.base_url.as_deref(), settings.provider.as_str()) {
        (Some(url), _) => url.to_string(),
        (None, "openai") => OPENAI_BASE_URL.to_string(),
        (None, "groq") => GROQ_BASE_URL.to_string(),
        (None, "together") => TOGETHER_BASE_URL.to_string(),
        (None, "fireworks") => FIREWORKS_BASE_URL.to_string(),
        (None, "mistral") => MISTRAL_BASE_URL.to_string(),
        (None, "ollama") => OLLAMA_BASE_URL.to_string(),
        (None, "vllm") => VLLM_BASE_URL.to_string(),
        (None, "lmstudio") => LMSTUDIO_BASE_URL.to_string(),
        (None, other) => {
            return Err(EmbeddingError::InvalidConfig(format!(
                "unknown embedding provider '{other}' and no base_url given"
            )));
        }
    };

    let is_local = base_url.contains("localhost")
        || base_url.contains("127.0.0.1")
        || base_url.contains("[::1]");
    if !is_local {
        warn!(
            provider = %settings.provider,
            base_url = %base_url,
            "Embedding driver configured to send data to external API, text content will leave this machine"
        );
    }

    let config = EmbeddingConfig {
        provider: settings.provider.clone(),
        model: settings.model.clone(),
        api_key,
        base_url,
    };

    let driver = OpenAIEmbeddingDriver::new(config)?;
    Ok(Arc::new(driver))
}
