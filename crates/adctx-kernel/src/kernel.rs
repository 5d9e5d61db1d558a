//! MemoryKernel: assembles the namespace engines, the encoder, and the
//! durable log into the memory service.
//!
//! Each namespace is guarded by its own `tokio::sync::RwLock`. Searches
//! share it; add, autosave, import and defrag take it exclusively. Writes
//! that touch the durable log downgrade to a shared guard and keep it until
//! the log call returns, so the log sees chunks in memory order and a defrag
//! can never interleave with a half-persisted add.

use crate::config::resolve_db_path;
use crate::encoder::{EncoderService, SwapReport};
use crate::error::{KernelError, KernelResult};
use adctx_memory::engine::{content_hash, prepare_embedding, NamespaceEngine};
use adctx_memory::log::{DurableLog, SampleQueue};
use adctx_memory::noise;
use adctx_memory::recovery::recover_all;
use adctx_memory::MemorySubstrate;
use adctx_runtime::embedding::{create_embedding_driver, EmbeddingDriver};
use adctx_types::config::{AdctxConfig, EmbeddingSettings};
use adctx_types::error::{AdctxError, AdctxResult};
use adctx_types::memory::{
    validate_namespace, AddOutcome, ChunkMetadata, DefragReport, DefragStatus, ExportFormat,
    ExportItem, ImportReport, NamespaceStats, NewChunk, QaPair, SearchHit, TrainingSample,
    SOURCE_AUTO_QUERY, SOURCE_IMPORT, SOURCE_UPDATE,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type SharedEngine = Arc<RwLock<NamespaceEngine>>;

/// Run a blocking durable-log call off the async workers.
async fn blocking<T, F>(f: F) -> AdctxResult<T>
where
    F: FnOnce() -> AdctxResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AdctxError::Internal(format!("blocking task failed: {e}")))?
}

/// The memory service.
pub struct MemoryKernel {
    config: AdctxConfig,
    encoder: EncoderService,
    log: Arc<dyn DurableLog>,
    queue: Arc<dyn SampleQueue>,
    engines: DashMap<String, SharedEngine>,
}

impl MemoryKernel {
    /// Open the SQLite log named by the config and recover every namespace.
    pub async fn boot(config: AdctxConfig) -> KernelResult<Self> {
        let db_path = resolve_db_path(&config);
        let substrate = MemorySubstrate::open(&db_path).map_err(|e| {
            KernelError::BootFailed(format!("cannot open {}: {e}", db_path.display()))
        })?;
        let encoder = EncoderService::from_settings(config.embedding.clone());
        Self::boot_with(
            config,
            Arc::new(substrate.chunks()),
            Arc::new(substrate.training()),
            encoder,
        )
        .await
    }

    /// Boot with injected collaborators. Returns once every namespace in
    /// the log has been replayed.
    pub async fn boot_with(
        config: AdctxConfig,
        log: Arc<dyn DurableLog>,
        queue: Arc<dyn SampleQueue>,
        encoder: EncoderService,
    ) -> KernelResult<Self> {
        let replay_log = Arc::clone(&log);
        let (recovered, stats) = tokio::task::spawn_blocking(move || {
            let mut recovered = Vec::new();
            let stats = recover_all(replay_log.as_ref(), |engine| recovered.push(engine))?;
            Ok::<_, AdctxError>((recovered, stats))
        })
        .await
        .map_err(|e| KernelError::BootFailed(format!("recovery task failed: {e}")))??;

        let engines = DashMap::new();
        for engine in recovered {
            engines.insert(
                engine.namespace().to_string(),
                Arc::new(RwLock::new(engine)),
            );
        }

        info!(
            namespaces = stats.len(),
            chunks = stats.iter().map(|s| s.loaded).sum::<usize>(),
            skipped = stats.iter().map(|s| s.skipped).sum::<usize>(),
            autosave = config.autosave.enabled,
            "Memory kernel recovered"
        );

        Ok(Self {
            config,
            encoder,
            log,
            queue,
            engines,
        })
    }

    pub fn config(&self) -> &AdctxConfig {
        &self.config
    }

    fn existing(&self, namespace: &str) -> Option<SharedEngine> {
        self.engines.get(namespace).map(|e| Arc::clone(e.value()))
    }

    fn engine_for(&self, namespace: &str) -> SharedEngine {
        let entry = self
            .engines
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(NamespaceEngine::new(namespace))));
        Arc::clone(entry.value())
    }

    /// Embed one text and normalize the result. Also returns the model id
    /// that produced the vector.
    async fn embed_one(&self, text: &str) -> AdctxResult<(Vec<f32>, String)> {
        let embedded = self.encoder.embed(&[text]).await?;
        let raw = embedded
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| AdctxError::EncoderUnavailable("no vector returned".to_string()))?;
        Ok((prepare_embedding(raw)?, embedded.model))
    }

    fn prepare_text(&self, text: &str) -> AdctxResult<String> {
        if text.trim().is_empty() {
            return Err(AdctxError::InvalidArgument(
                "text must not be empty".to_string(),
            ));
        }
        if !self.config.ingest.filter_noise {
            return Ok(text.to_string());
        }
        let cleaned = noise::preprocess(text)?;
        if cleaned.trim().is_empty() {
            return Err(AdctxError::InvalidArgument(
                "text is empty after noise filtering".to_string(),
            ));
        }
        Ok(cleaned)
    }

    async fn persist(
        &self,
        namespace: &str,
        text: String,
        embedding: Vec<f32>,
        metadata: ChunkMetadata,
    ) -> AdctxResult<i64> {
        let log = Arc::clone(&self.log);
        let ns = namespace.to_string();
        blocking(move || log.append(&ns, &text, &embedding, &metadata)).await
    }

    /// Memorize `text`: it is searchable as soon as the in-memory append
    /// lands. Then it is written to the durable log and queued for training.
    ///
    /// A durable failure surfaces as `Persistence`; the chunk stays in
    /// memory and is lost on restart.
    pub async fn add(
        &self,
        namespace: &str,
        text: &str,
        metadata: ChunkMetadata,
    ) -> AdctxResult<AddOutcome> {
        validate_namespace(namespace)?;
        let text = self.prepare_text(text)?;
        let (embedding, model) = self.embed_one(&text).await?;
        let metadata = metadata.embedded_by(model);

        let engine = self.engine_for(namespace);
        let mut guard = engine.write().await;
        let position = guard.append(text.clone(), &embedding, metadata.clone())?;
        let guard = guard.downgrade();
        let persisted = self
            .persist(namespace, text.clone(), embedding, metadata)
            .await;
        drop(guard);

        let chunk_id = match persisted {
            Ok(id) => id,
            Err(e) => {
                warn!(namespace, position, error = %e, "Chunk kept in memory but not persisted");
                return Err(e);
            }
        };

        let queue = Arc::clone(&self.queue);
        let ns = namespace.to_string();
        blocking(move || queue.enqueue(&ns, &text)).await?;

        debug!(namespace, position, chunk_id, "Added chunk");
        Ok(AddOutcome {
            namespace: namespace.to_string(),
            position,
            chunk_id,
        })
    }

    /// Memorize a question/answer pair in the canonical two-line format.
    pub async fn update(
        &self,
        namespace: &str,
        question: &str,
        answer: &str,
    ) -> AdctxResult<AddOutcome> {
        if question.trim().is_empty() {
            return Err(AdctxError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }
        let text = QaPair::new(question, answer).format();
        self.add(namespace, &text, ChunkMetadata::with_source(SOURCE_UPDATE))
            .await
    }

    /// Top-`k` most similar chunks, best first. With autosave on, the query
    /// itself is then memorized unless an identical query already was.
    /// Autosave failures are logged and never fail the search. A namespace
    /// with no chunks answers `[]` without consulting the encoder.
    pub async fn search(
        &self,
        namespace: &str,
        query: &str,
        k: usize,
    ) -> AdctxResult<Vec<SearchHit>> {
        validate_namespace(namespace)?;
        let max = self.config.search.max_top_k;
        if k == 0 || k > max {
            return Err(AdctxError::InvalidArgument(format!(
                "k must be between 1 and {max}, got {k}"
            )));
        }
        if query.trim().is_empty() {
            return Err(AdctxError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }

        let autosave = self.config.autosave.enabled;
        let populated = match self.existing(namespace) {
            Some(engine) => {
                let empty = engine.read().await.is_empty();
                (!empty).then_some(engine)
            }
            None => None,
        };
        let Some(engine) = populated else {
            if autosave {
                self.autosave_logged(namespace, query, None).await;
            }
            return Ok(Vec::new());
        };

        let (query_vec, model) = self.embed_one(query).await?;
        let hits = engine.read().await.search(&query_vec, k)?;

        if autosave {
            self.autosave_logged(namespace, query, Some((query_vec, model)))
                .await;
        }
        Ok(hits)
    }

    async fn autosave_logged(
        &self,
        namespace: &str,
        query: &str,
        embedded: Option<(Vec<f32>, String)>,
    ) {
        if let Err(e) = self.autosave(namespace, query, embedded).await {
            warn!(namespace, error = %e, "Autosave failed");
        }
    }

    /// Memorize a query unless an identical one already was. The hash check
    /// and the append run under one exclusive guard, so two identical
    /// concurrent queries insert at most once. The query is embedded here
    /// when the search did not need to.
    async fn autosave(
        &self,
        namespace: &str,
        query: &str,
        embedded: Option<(Vec<f32>, String)>,
    ) -> AdctxResult<bool> {
        let (embedding, model) = match embedded {
            Some(embedded) => embedded,
            None => self.embed_one(query).await?,
        };
        let hash = content_hash(query);
        let engine = self.engine_for(namespace);
        let mut guard = engine.write().await;
        if guard.contains_hash(&hash) {
            debug!(namespace, "Autosave skipped, query already memorized");
            return Ok(false);
        }
        let metadata = ChunkMetadata::with_source(SOURCE_AUTO_QUERY)
            .hashed(hash)
            .embedded_by(model);
        guard.append(query.to_string(), &embedding, metadata.clone())?;
        let guard = guard.downgrade();
        let persisted = self
            .persist(namespace, query.to_string(), embedding, metadata)
            .await;
        drop(guard);
        persisted?;
        debug!(namespace, "Autosaved query");
        Ok(true)
    }

    /// Drop duplicate chunks (first occurrence wins) and rewrite the
    /// namespace in the durable log, all under one exclusive guard.
    ///
    /// After a `Partial` run the next defrag retries the rewrite even when
    /// memory has nothing left to compact. A namespace whose log holds
    /// chunks that could not be replayed is never rewritten.
    pub async fn defrag(&self, namespace: &str) -> AdctxResult<DefragReport> {
        validate_namespace(namespace)?;
        let Some(engine) = self.existing(namespace) else {
            return Ok(noop_report(namespace, 0));
        };

        let mut guard = engine.write().await;
        if guard.unreplayed() > 0 {
            return Err(AdctxError::InvalidArgument(format!(
                "namespace '{namespace}' has {} logged chunks that were not recovered; \
                 rebuild it before defragmenting",
                guard.unreplayed()
            )));
        }
        let before = guard.len();
        let removed = match guard.compact() {
            Some(removed) => removed,
            None if guard.log_dirty() => 0,
            None => {
                info!(namespace, size = before, "Defrag found no duplicates");
                return Ok(noop_report(namespace, before));
            }
        };
        let after = guard.len();
        let chunks = guard.to_new_chunks();

        let log = Arc::clone(&self.log);
        let ns = namespace.to_string();
        let rewritten = blocking(move || log.replace_namespace(&ns, &chunks)).await;
        guard.set_log_dirty(rewritten.is_err());
        drop(guard);

        let (status, error) = match rewritten {
            Ok(_) => {
                info!(namespace, before, after, removed, "Defrag complete");
                (DefragStatus::Done, None)
            }
            Err(e) => {
                warn!(
                    namespace,
                    before,
                    after,
                    error = %e,
                    "Defrag compacted memory but the durable rewrite failed"
                );
                (DefragStatus::Partial, Some(e.to_string()))
            }
        };
        Ok(DefragReport {
            namespace: namespace.to_string(),
            status,
            before,
            after,
            removed,
            error,
        })
    }

    /// Hand up to `max_batch` pending training samples to a consumer.
    pub async fn claim(
        &self,
        namespace: &str,
        max_batch: usize,
    ) -> AdctxResult<Vec<TrainingSample>> {
        validate_namespace(namespace)?;
        if max_batch == 0 {
            return Err(AdctxError::InvalidArgument(
                "max_batch must be at least 1".to_string(),
            ));
        }
        let queue = Arc::clone(&self.queue);
        let ns = namespace.to_string();
        blocking(move || queue.claim(&ns, max_batch)).await
    }

    /// Pending training samples in a namespace.
    pub async fn pending(&self, namespace: &str) -> AdctxResult<usize> {
        validate_namespace(namespace)?;
        let queue = Arc::clone(&self.queue);
        let ns = namespace.to_string();
        blocking(move || queue.pending_count(&ns)).await
    }

    /// All texts of a namespace, in insertion order.
    pub async fn export(&self, namespace: &str) -> AdctxResult<Vec<ExportItem>> {
        validate_namespace(namespace)?;
        match self.existing(namespace) {
            Some(engine) => Ok(engine.read().await.export()),
            None => Ok(Vec::new()),
        }
    }

    /// Export a namespace as JSON or MessagePack.
    pub async fn export_bytes(
        &self,
        namespace: &str,
        format: ExportFormat,
    ) -> AdctxResult<Vec<u8>> {
        let items = self.export(namespace).await?;
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(&items)
                .map_err(|e| AdctxError::Serialization(e.to_string())),
            ExportFormat::MessagePack => rmp_serde::to_vec_named(&items)
                .map_err(|e| AdctxError::Serialization(e.to_string())),
        }
    }

    /// Re-embed and append exported items. Imports are not queued for
    /// training. Items without text are skipped.
    pub async fn import(
        &self,
        namespace: &str,
        items: Vec<ExportItem>,
    ) -> AdctxResult<ImportReport> {
        validate_namespace(namespace)?;
        let mut report = ImportReport::default();

        let mut kept = Vec::with_capacity(items.len());
        for mut item in items {
            if item.text.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            if item.metadata.source.is_none() {
                item.metadata.source = Some(SOURCE_IMPORT.to_string());
            }
            kept.push(item);
        }
        if kept.is_empty() {
            return Ok(report);
        }

        let texts: Vec<&str> = kept.iter().map(|i| i.text.as_str()).collect();
        let embedded = self.encoder.embed(&texts).await?;
        let model = embedded.model;
        let mut prepared = Vec::with_capacity(kept.len());
        for (item, raw) in kept.into_iter().zip(embedded.vectors) {
            match prepare_embedding(raw) {
                Ok(embedding) => prepared.push(NewChunk {
                    text: item.text,
                    embedding,
                    metadata: item.metadata.embedded_by(model.as_str()),
                }),
                Err(e) => report.errors.push(format!("{}: {e}", preview(&item.text))),
            }
        }

        let engine = self.engine_for(namespace);
        let mut guard = engine.write().await;
        let mut appended = Vec::with_capacity(prepared.len());
        for chunk in prepared {
            match guard.append(chunk.text.clone(), &chunk.embedding, chunk.metadata.clone()) {
                Ok(_) => appended.push(chunk),
                Err(e) => report.errors.push(format!("{}: {e}", preview(&chunk.text))),
            }
        }
        if appended.is_empty() {
            return Ok(report);
        }
        report.imported = appended.len() as u64;

        let guard = guard.downgrade();
        let log = Arc::clone(&self.log);
        let ns = namespace.to_string();
        let persisted = blocking(move || log.bulk_append(&ns, &appended)).await;
        drop(guard);
        persisted?;

        info!(
            namespace,
            imported = report.imported,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Import complete"
        );
        Ok(report)
    }

    /// Decode JSON or MessagePack items and import them.
    pub async fn import_bytes(
        &self,
        namespace: &str,
        data: &[u8],
        format: ExportFormat,
    ) -> AdctxResult<ImportReport> {
        let items: Vec<ExportItem> = match format {
            ExportFormat::Json => serde_json::from_slice(data)
                .map_err(|e| AdctxError::Serialization(e.to_string()))?,
            ExportFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| AdctxError::Serialization(e.to_string()))?,
        };
        self.import(namespace, items).await
    }

    /// Make `driver` answer all future embed calls. Stored chunks keep
    /// their embeddings; namespaces holding chunks from another model
    /// report `rebuild_required`.
    pub async fn swap_encoder(&self, driver: Arc<dyn EmbeddingDriver>) -> SwapReport {
        self.encoder.swap(driver).await
    }

    /// Build a driver from `settings` and swap it in. Invalid settings
    /// leave the current encoder in place.
    pub async fn reload_encoder(&self, settings: &EmbeddingSettings) -> AdctxResult<SwapReport> {
        let driver = create_embedding_driver(settings)
            .map_err(|e| AdctxError::InvalidArgument(e.to_string()))?;
        Ok(self.swap_encoder(driver).await)
    }

    /// Current encoder generation.
    pub fn encoder_generation(&self) -> u64 {
        self.encoder.generation()
    }

    /// Size, dimension and rebuild flag of a namespace. The flag compares
    /// each chunk's model id with the active encoder, loading it if needed;
    /// with the encoder unreachable only mixed or missing chunks count.
    pub async fn stats(&self, namespace: &str) -> AdctxResult<NamespaceStats> {
        validate_namespace(namespace)?;
        let stats = match self.existing(namespace) {
            Some(engine) => {
                let current = match self.encoder.current_model().await {
                    Ok(model) => Some(model),
                    Err(e) => {
                        debug!(namespace, error = %e, "Encoder unavailable for stats");
                        None
                    }
                };
                let guard = engine.read().await;
                NamespaceStats {
                    namespace: namespace.to_string(),
                    size: guard.len(),
                    dimension: guard.dimension(),
                    rebuild_required: guard.rebuild_required(current.as_deref()),
                }
            }
            None => NamespaceStats {
                namespace: namespace.to_string(),
                size: 0,
                dimension: None,
                rebuild_required: false,
            },
        };
        Ok(stats)
    }

    /// Namespaces with an engine, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

fn noop_report(namespace: &str, size: usize) -> DefragReport {
    DefragReport {
        namespace: namespace.to_string(),
        status: DefragStatus::Noop,
        before: size,
        after: size,
        removed: 0,
        error: None,
    }
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(40).collect();
    if short.len() < text.len() {
        short.push_str("...");
    }
    short
}
