//! Namespace memory engine: the in-memory projection of one namespace.
//!
//! Holds three parallel sequences (text, metadata, vector index) that always
//! have equal length and matching insertion order. Position is the tie-break
//! for equal-score search results and the "keep the earliest" rule in
//! compaction.

use crate::index::{normalize, IndexError, VectorIndex};
use adctx_types::error::{AdctxError, AdctxResult};
use adctx_types::memory::{ChunkMetadata, ExportItem, NewChunk, SearchHit};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};

/// SHA-256 hex digest of a text; the content hash used by autosave and
/// compaction.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Dedup key for a chunk: its explicit `hash` metadata, else the hash of
/// its raw text.
pub fn content_key(text: &str, metadata: &ChunkMetadata) -> String {
    match &metadata.hash {
        Some(hash) => hash.clone(),
        None => content_hash(text),
    }
}

/// Normalize a freshly computed embedding to unit L2 norm.
pub fn prepare_embedding(mut raw: Vec<f32>) -> AdctxResult<Vec<f32>> {
    if raw.is_empty() {
        return Err(AdctxError::EncoderUnavailable(
            "encoder returned an empty embedding".to_string(),
        ));
    }
    if !normalize(&mut raw) {
        return Err(AdctxError::EncoderUnavailable(
            "encoder returned a zero or non-finite embedding".to_string(),
        ));
    }
    Ok(raw)
}

/// In-memory state of one namespace.
#[derive(Debug, Clone)]
pub struct NamespaceEngine {
    namespace: String,
    texts: Vec<String>,
    metadata: Vec<ChunkMetadata>,
    index: VectorIndex,
    /// Every `metadata.hash` currently present.
    hashes: HashSet<String>,
    /// Every `metadata.model` currently present.
    models: BTreeSet<String>,
    /// Logged chunks that replay could not load.
    unreplayed: usize,
    /// The durable log still holds chunks that compaction removed here.
    log_dirty: bool,
}

impl NamespaceEngine {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            texts: Vec::new(),
            metadata: Vec::new(),
            index: VectorIndex::new(),
            hashes: HashSet::new(),
            models: BTreeSet::new(),
            unreplayed: 0,
            log_dirty: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    /// Record a logged chunk that could not be replayed into this engine.
    pub fn note_unreplayed(&mut self) {
        self.unreplayed += 1;
    }

    /// Number of logged chunks missing from memory after replay. While
    /// non-zero, memory is not a faithful copy of the log.
    pub fn unreplayed(&self) -> usize {
        self.unreplayed
    }

    pub fn log_dirty(&self) -> bool {
        self.log_dirty
    }

    pub fn set_log_dirty(&mut self, dirty: bool) {
        self.log_dirty = dirty;
    }

    /// True when the stored embeddings are not all from `current_model`:
    /// chunks carry another model id, several model ids are mixed, or some
    /// logged chunks never made it into memory. Chunks without a model id
    /// are not counted against the current model.
    pub fn rebuild_required(&self, current_model: Option<&str>) -> bool {
        if self.unreplayed > 0 {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        self.models.len() > 1
            || current_model.is_some_and(|current| self.models.iter().any(|m| m != current))
    }

    fn map_index_error(&self, err: IndexError) -> AdctxError {
        match err {
            IndexError::Dimension { expected, actual } => AdctxError::DimensionMismatch {
                namespace: self.namespace.clone(),
                expected,
                actual,
            },
            IndexError::Empty => AdctxError::EncoderUnavailable("empty embedding".to_string()),
        }
    }

    /// Append a chunk whose embedding is already normalized (fresh adds) or
    /// persisted (replay). Returns the new position. Nothing changes on
    /// error.
    pub fn append(
        &mut self,
        text: String,
        embedding: &[f32],
        metadata: ChunkMetadata,
    ) -> AdctxResult<usize> {
        let position = self
            .index
            .push(embedding)
            .map_err(|e| self.map_index_error(e))?;
        if let Some(hash) = &metadata.hash {
            self.hashes.insert(hash.clone());
        }
        if let Some(model) = &metadata.model {
            self.models.insert(model.clone());
        }
        self.texts.push(text);
        self.metadata.push(metadata);
        debug_assert_eq!(self.texts.len(), self.index.len());
        Ok(position)
    }

    /// Exact top-k search with a normalized query vector. An empty engine
    /// yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> AdctxResult<Vec<SearchHit>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let ranked = self
            .index
            .top_k(query, k)
            .map_err(|e| self.map_index_error(e))?;
        Ok(ranked
            .into_iter()
            .map(|(pos, score)| SearchHit {
                text: self.texts[pos].clone(),
                metadata: self.metadata[pos].clone(),
                score,
            })
            .collect())
    }

    /// Whether any chunk carries `hash` in its metadata.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Positions to keep when deduplicating by content key, first
    /// occurrence wins. `None` when there are no duplicates.
    fn dedup_plan(&self) -> Option<Vec<usize>> {
        let mut seen = HashSet::with_capacity(self.len());
        let retained: Vec<usize> = (0..self.len())
            .filter(|&pos| seen.insert(content_key(&self.texts[pos], &self.metadata[pos])))
            .collect();
        (retained.len() < self.len()).then_some(retained)
    }

    /// Drop later duplicates in place, preserving relative order, and
    /// rebuild the index. Returns the number of chunks removed, or `None`
    /// when the namespace was already unique.
    pub fn compact(&mut self) -> Option<usize> {
        let retained = self.dedup_plan()?;
        let removed = self.len() - retained.len();

        let mut texts = Vec::with_capacity(retained.len());
        let mut metadata = Vec::with_capacity(retained.len());
        for &pos in &retained {
            texts.push(std::mem::take(&mut self.texts[pos]));
            metadata.push(std::mem::take(&mut self.metadata[pos]));
        }
        self.index.retain_positions(&retained);
        self.texts = texts;
        self.metadata = metadata;
        self.hashes = self
            .metadata
            .iter()
            .filter_map(|m| m.hash.clone())
            .collect();
        self.models = self
            .metadata
            .iter()
            .filter_map(|m| m.model.clone())
            .collect();
        Some(removed)
    }

    /// Iterate `(text, embedding, metadata)` in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[f32], &ChunkMetadata)> + '_ {
        (0..self.len()).filter_map(move |pos| {
            let embedding = self.index.get(pos)?;
            Some((self.texts[pos].as_str(), embedding, &self.metadata[pos]))
        })
    }

    /// Owned copies of every chunk, in order, for a durable rewrite.
    pub fn to_new_chunks(&self) -> Vec<NewChunk> {
        self.entries()
            .map(|(text, embedding, metadata)| NewChunk {
                text: text.to_string(),
                embedding: embedding.to_vec(),
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Texts and metadata in insertion order.
    pub fn export(&self) -> Vec<ExportItem> {
        self.texts
            .iter()
            .zip(&self.metadata)
            .map(|(text, metadata)| ExportItem {
                text: text.clone(),
                metadata: metadata.clone(),
            })
            .collect()
    }
}
