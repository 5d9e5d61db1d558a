//! Memory types: chunks, metadata, search hits, training samples, defrag
//! reports, and export/import payloads.

use crate::error::{AdctxError, AdctxResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Namespace used when a caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "global";

/// Maximum namespace length (matches the durable log column width).
pub const MAX_NAMESPACE_LEN: usize = 64;

/// `metadata.source` tag for Q/A ingestion writes.
pub const SOURCE_UPDATE: &str = "update";
/// `metadata.source` tag for autosaved query texts.
pub const SOURCE_AUTO_QUERY: &str = "auto_query";
/// `metadata.source` tag for admin imports.
pub const SOURCE_IMPORT: &str = "import";

/// Check that a namespace name is non-empty, bounded, and uses only
/// ASCII alphanumerics and `- _ . :`.
pub fn validate_namespace(namespace: &str) -> AdctxResult<()> {
    if namespace.is_empty() {
        return Err(AdctxError::InvalidArgument(
            "namespace must not be empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(AdctxError::InvalidArgument(format!(
            "namespace exceeds {MAX_NAMESPACE_LEN} characters"
        )));
    }
    let valid = namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if !valid {
        return Err(AdctxError::InvalidArgument(format!(
            "unknown namespace format: '{namespace}'"
        )));
    }
    Ok(())
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Open string-to-scalar metadata attached to a chunk.
///
/// Three keys are recognized by the engine: `source` (who wrote the
/// chunk), `hash` (content key used by autosave dedup and compaction) and
/// `model` (id of the encoder that produced the embedding, stamped by the
/// kernel). All other keys are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetaValue>,
}

impl ChunkMetadata {
    /// Metadata carrying only a source tag.
    pub fn with_source(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            ..Default::default()
        }
    }

    /// Builder-style setter for the content hash.
    pub fn hashed(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Builder-style setter for the producing encoder's model id.
    pub fn embedded_by(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder-style setter for an extra key.
    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// True when no keys are set.
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.hash.is_none()
            && self.model.is_none()
            && self.extra.is_empty()
    }
}

/// One memorized unit as persisted in the durable log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Monotonic id assigned by the durable log.
    pub id: i64,
    pub namespace: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub created_at: DateTime<Utc>,
}

/// Payload for appending a chunk whose embedding is already computed.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOutcome {
    pub namespace: String,
    /// Position in the namespace sequence (stable until the next defrag).
    pub position: usize,
    /// Durable log id of the persisted chunk.
    pub chunk_id: i64,
}

/// Lifecycle state of a training sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleState {
    Pending,
    Consumed,
}

impl SampleState {
    /// Column value used by the durable queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleState::Pending => "pending",
            SampleState::Consumed => "consumed",
        }
    }

    /// Parse a column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SampleState::Pending),
            "consumed" => Some(SampleState::Consumed),
            _ => None,
        }
    }
}

/// A queued text awaiting consumption by the external trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub id: i64,
    pub namespace: String,
    pub text: String,
    pub state: SampleState,
    pub created_at: DateTime<Utc>,
}

/// The canonical two-line ingestion format: `"Q: <question>\nA: <answer>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// Encode as the canonical ingestion text.
    pub fn format(&self) -> String {
        format!("Q: {}\nA: {}", self.question, self.answer)
    }

    /// Decode the canonical ingestion text. Returns `None` for anything
    /// that is not a non-empty question followed by an answer line.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix("Q: ")?;
        let (question, answer) = rest.split_once("\nA: ")?;
        if question.trim().is_empty() || question.contains('\n') {
            return None;
        }
        Some(Self::new(question, answer))
    }
}

/// Outcome of a compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefragStatus {
    /// No duplicates found; nothing changed.
    Noop,
    /// Memory compacted and the durable log rewritten.
    Done,
    /// Memory compacted but the durable rewrite failed.
    Partial,
}

/// Report from a compaction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefragReport {
    pub namespace: String,
    pub status: DefragStatus,
    /// Namespace size before compaction.
    pub before: usize,
    /// Namespace size after compaction.
    pub after: usize,
    /// Number of duplicates discarded.
    pub removed: usize,
    /// Durable rewrite failure, when `status` is `Partial`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One exported item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "ChunkMetadata::is_empty")]
    pub metadata: ChunkMetadata,
}

/// Format for namespace export/import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// JSON format.
    Json,
    /// MessagePack binary format.
    MessagePack,
}

/// Report from a namespace import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    /// Number of texts imported.
    pub imported: u64,
    /// Number of items skipped for having no text.
    pub skipped: u64,
    /// Errors encountered during import.
    pub errors: Vec<String>,
}

/// Point-in-time view of one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub size: usize,
    pub dimension: Option<usize>,
    /// Set when the namespace holds embeddings from an encoder other than
    /// the active one, or some of its logged chunks could not be replayed.
    pub rebuild_required: bool,
}
