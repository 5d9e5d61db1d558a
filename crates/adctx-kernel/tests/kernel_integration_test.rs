//! Integration tests for the MemoryKernel.
//!
//! These tests drive the public kernel API end-to-end with the deterministic
//! hashing encoder over a real SQLite log (in-memory or in a temp dir).
//! A wrapping log with injectable failures exercises the best-effort
//! memory/log consistency model.

use adctx_kernel::{EncoderService, MemoryKernel};
use adctx_memory::chunks::ChunkStore;
use adctx_memory::log::{DurableLog, SampleQueue};
use adctx_memory::MemorySubstrate;
use adctx_runtime::embedding::{EmbeddingDriver, EmbeddingError, HashingEmbeddingDriver};
use adctx_types::config::{AdctxConfig, EmbeddingSettings};
use adctx_types::error::{AdctxError, AdctxResult, ErrorKind};
use adctx_types::memory::{
    Chunk, ChunkMetadata, DefragStatus, ExportFormat, ExportItem, NewChunk, SOURCE_AUTO_QUERY,
    SOURCE_IMPORT,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DIMS: usize = 256;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// Durable log that delegates to SQLite but can be told to fail.
struct FlakyLog {
    inner: ChunkStore,
    fail_appends: AtomicBool,
    fail_rewrites: AtomicBool,
}

impl FlakyLog {
    fn new(inner: ChunkStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_appends: AtomicBool::new(false),
            fail_rewrites: AtomicBool::new(false),
        })
    }

    fn check(&self, flag: &AtomicBool) -> AdctxResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AdctxError::Persistence("disk unavailable".to_string()));
        }
        Ok(())
    }
}

impl DurableLog for FlakyLog {
    fn append(
        &self,
        namespace: &str,
        text: &str,
        embedding: &[f32],
        metadata: &ChunkMetadata,
    ) -> AdctxResult<i64> {
        self.check(&self.fail_appends)?;
        self.inner.append(namespace, text, embedding, metadata)
    }

    fn bulk_append(&self, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>> {
        self.check(&self.fail_appends)?;
        self.inner.bulk_append(namespace, chunks)
    }

    fn stream(&self, namespace: &str) -> AdctxResult<Vec<Chunk>> {
        self.inner.stream(namespace)
    }

    fn namespaces(&self) -> AdctxResult<Vec<String>> {
        self.inner.namespaces()
    }

    fn delete_namespace(&self, namespace: &str) -> AdctxResult<usize> {
        self.check(&self.fail_rewrites)?;
        self.inner.delete_namespace(namespace)
    }

    fn replace_namespace(&self, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>> {
        self.check(&self.fail_rewrites)?;
        self.inner.replace_namespace(namespace, chunks)
    }
}

/// Encoder that is never reachable.
struct DownEncoder;

#[async_trait]
impl EmbeddingDriver for DownEncoder {
    async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Http("connection refused".to_string()))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_id(&self) -> String {
        "down/encoder".to_string()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn hashing(model: &str, dims: usize) -> Arc<dyn EmbeddingDriver> {
    Arc::new(HashingEmbeddingDriver::new(model, dims).unwrap())
}

fn config(autosave: bool) -> AdctxConfig {
    let mut config = AdctxConfig::default();
    config.autosave.enabled = autosave;
    config.embedding.dimensions = DIMS;
    config
}

async fn kernel_over(substrate: &MemorySubstrate, autosave: bool) -> MemoryKernel {
    MemoryKernel::boot_with(
        config(autosave),
        Arc::new(substrate.chunks()),
        Arc::new(substrate.training()),
        EncoderService::with_driver(hashing("test", DIMS)),
    )
    .await
    .unwrap()
}

async fn kernel(autosave: bool) -> MemoryKernel {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    kernel_over(&substrate, autosave).await
}

async fn file_kernel(db: &Path, autosave: bool) -> MemoryKernel {
    let mut config = config(autosave);
    config.storage.db_path = Some(db.to_path_buf());
    MemoryKernel::boot(config).await.unwrap()
}

async fn file_kernel_with_model(db: &Path, model: &str) -> MemoryKernel {
    let mut config = config(false);
    config.storage.db_path = Some(db.to_path_buf());
    config.embedding.model = model.to_string();
    MemoryKernel::boot(config).await.unwrap()
}

fn unit_vector(dims: usize) -> Vec<f32> {
    let mut v = vec![0.0; dims];
    v[0] = 1.0;
    v
}

async fn texts(kernel: &MemoryKernel, ns: &str) -> Vec<String> {
    kernel
        .export(ns)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.text)
        .collect()
}

const CORPUS: &[&str] = &[
    "rust ownership and borrowing rules",
    "tokio runtime schedules async tasks",
    "sqlite stores rows in btree pages",
    "sourdough bread needs a long ferment",
    "cosine similarity compares vector angles",
    "the borrow checker rejects dangling references",
];

async fn seed(kernel: &MemoryKernel, ns: &str) {
    for text in CORPUS {
        kernel
            .add(ns, text, ChunkMetadata::default())
            .await
            .unwrap();
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_search_scores_non_increasing_and_bounded() {
    let k = kernel(false).await;
    seed(&k, "t").await;

    for top_k in [1, 3, 6, 20] {
        let hits = k.search("t", "borrowing references in rust", top_k).await.unwrap();
        assert_eq!(hits.len(), top_k.min(CORPUS.len()));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[tokio::test]
async fn test_search_self_match_scores_one() {
    let k = kernel(false).await;
    seed(&k, "t").await;

    for text in CORPUS {
        let hits = k.search("t", text, 3).await.unwrap();
        assert_eq!(hits[0].text, *text);
        assert!((hits[0].score - 1.0).abs() < 1e-4, "score {}", hits[0].score);
    }
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let k = kernel(false).await;
    k.add("a", "only in a", ChunkMetadata::default())
        .await
        .unwrap();
    k.add("b", "only in b", ChunkMetadata::default())
        .await
        .unwrap();
    let hits = k.search("a", "only in b", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "only in a");
    assert_eq!(k.namespaces(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_invalid_arguments_have_no_side_effects() {
    let k = kernel(true).await;
    let err = k.search("bad ns", "q", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(matches!(
        k.search("t", "q", 0).await,
        Err(AdctxError::InvalidArgument(_))
    ));
    assert!(matches!(
        k.add("t", "", ChunkMetadata::default()).await,
        Err(AdctxError::InvalidArgument(_))
    ));
    assert!(k.namespaces().is_empty());
}

#[tokio::test]
async fn test_encoder_unavailable_aborts_cleanly() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let k = MemoryKernel::boot_with(
        config(true),
        Arc::new(substrate.chunks()),
        Arc::new(substrate.training()),
        EncoderService::with_driver(Arc::new(DownEncoder)),
    )
    .await
    .unwrap();

    let err = k
        .add("t", "hello", ChunkMetadata::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncoderUnavailable);
    assert_eq!(k.stats("t").await.unwrap().size, 0);
    assert_eq!(k.pending("t").await.unwrap(), 0);
    assert!(substrate.chunks().stream("t").unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_namespace_search_succeeds_with_encoder_down() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let k = MemoryKernel::boot_with(
        config(true),
        Arc::new(substrate.chunks()),
        Arc::new(substrate.training()),
        EncoderService::with_driver(Arc::new(DownEncoder)),
    )
    .await
    .unwrap();

    // The autosave cannot embed, which is logged and ignored.
    let hits = k.search("fresh", "anything", 4).await.unwrap();
    assert!(hits.is_empty());
    assert_eq!(k.stats("fresh").await.unwrap().size, 0);
    assert!(k.namespaces().is_empty());
    assert!(substrate.chunks().stream("fresh").unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Autosave
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_autosave_memorizes_query_once() {
    let k = kernel(true).await;
    seed(&k, "t").await;
    let before = k.stats("t").await.unwrap().size;

    k.search("t", "what is a btree", 2).await.unwrap();
    assert_eq!(k.stats("t").await.unwrap().size, before + 1);
    k.search("t", "what is a btree", 2).await.unwrap();
    assert_eq!(k.stats("t").await.unwrap().size, before + 1);

    let items = k.export("t").await.unwrap();
    let saved: Vec<_> = items
        .iter()
        .filter(|i| i.metadata.source.as_deref() == Some(SOURCE_AUTO_QUERY))
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].text, "what is a btree");
    assert!(saved[0].metadata.hash.is_some());

    // Autosaves are not training samples.
    assert_eq!(k.pending("t").await.unwrap(), CORPUS.len());
}

#[tokio::test]
async fn test_autosave_results_exclude_the_query_itself() {
    let k = kernel(true).await;
    let hits = k.search("t", "anything", 4).await.unwrap();
    assert!(hits.is_empty());
    let hits = k.search("t", "anything", 4).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "anything");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_queries_autosave_once() {
    let k = Arc::new(kernel(true).await);
    seed(&k, "t").await;
    let before = k.stats("t").await.unwrap().size;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let k = Arc::clone(&k);
            tokio::spawn(async move { k.search("t", "same query text", 3).await })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }
    assert_eq!(k.stats("t").await.unwrap().size, before + 1);
}

#[tokio::test]
async fn test_autosave_persistence_failure_does_not_fail_search() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let log = FlakyLog::new(substrate.chunks());
    let k = MemoryKernel::boot_with(
        config(true),
        log.clone(),
        Arc::new(substrate.training()),
        EncoderService::with_driver(hashing("test", DIMS)),
    )
    .await
    .unwrap();

    log.fail_appends.store(true, Ordering::SeqCst);
    let hits = k.search("t", "query while disk is down", 2).await.unwrap();
    assert!(hits.is_empty());
    assert_eq!(k.stats("t").await.unwrap().size, 1);
    assert!(substrate.chunks().stream("t").unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Defrag
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_defrag_keeps_first_occurrence_and_is_idempotent() {
    let k = kernel(false).await;
    for text in ["alpha", "beta", "alpha", "gamma", "beta"] {
        k.add("t", text, ChunkMetadata::default()).await.unwrap();
    }

    let report = k.defrag("t").await.unwrap();
    assert_eq!(report.status, DefragStatus::Done);
    assert_eq!((report.before, report.after, report.removed), (5, 3, 2));
    assert_eq!(texts(&k, "t").await, vec!["alpha", "beta", "gamma"]);

    let snapshot = k.export_bytes("t", ExportFormat::Json).await.unwrap();
    let again = k.defrag("t").await.unwrap();
    assert_eq!(again.status, DefragStatus::Noop);
    assert_eq!(again.removed, 0);
    assert_eq!(
        k.export_bytes("t", ExportFormat::Json).await.unwrap(),
        snapshot
    );

    // The rebuilt index still answers.
    let hits = k.search("t", "gamma", 1).await.unwrap();
    assert_eq!(hits[0].text, "gamma");
}

#[tokio::test]
async fn test_defrag_partial_keeps_compacted_memory() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let log = FlakyLog::new(substrate.chunks());
    let k = MemoryKernel::boot_with(
        config(false),
        log.clone(),
        Arc::new(substrate.training()),
        EncoderService::with_driver(hashing("test", DIMS)),
    )
    .await
    .unwrap();
    for text in ["dup", "dup", "unique"] {
        k.add("t", text, ChunkMetadata::default()).await.unwrap();
    }

    log.fail_rewrites.store(true, Ordering::SeqCst);
    let report = k.defrag("t").await.unwrap();
    assert_eq!(report.status, DefragStatus::Partial);
    assert!(report.error.is_some());
    assert_eq!(texts(&k, "t").await, vec!["dup", "unique"]);
    assert_eq!(substrate.chunks().stream("t").unwrap().len(), 3);

    // Still failing: the retry stays partial.
    let report = k.defrag("t").await.unwrap();
    assert_eq!(report.status, DefragStatus::Partial);
    assert_eq!(substrate.chunks().stream("t").unwrap().len(), 3);

    // Once the log is back, the retry rewrites it from memory.
    log.fail_rewrites.store(false, Ordering::SeqCst);
    let report = k.defrag("t").await.unwrap();
    assert_eq!(report.status, DefragStatus::Done);
    assert_eq!((report.before, report.after, report.removed), (2, 2, 0));
    assert_eq!(substrate.chunks().stream("t").unwrap().len(), 2);
    assert_eq!(k.defrag("t").await.unwrap().status, DefragStatus::Noop);

    let restarted = kernel_over(&substrate, false).await;
    assert_eq!(texts(&restarted, "t").await, vec!["dup", "unique"]);
}

#[tokio::test]
async fn test_partially_recovered_namespace_is_never_rewritten() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let log = substrate.chunks();
    let wide = unit_vector(DIMS);
    log.append("t", "dup", &wide, &ChunkMetadata::default())
        .unwrap();
    log.append("t", "dup", &wide, &ChunkMetadata::default())
        .unwrap();
    log.append("t", "narrow", &unit_vector(32), &ChunkMetadata::default())
        .unwrap();

    let k = kernel_over(&substrate, false).await;
    let stats = k.stats("t").await.unwrap();
    assert_eq!(stats.size, 2);
    assert!(stats.rebuild_required);

    let err = k.defrag("t").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(k.stats("t").await.unwrap().size, 2);
    let logged: Vec<String> = log
        .stream("t")
        .unwrap()
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(logged, vec!["dup", "dup", "narrow"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_search_during_defrag_sees_one_consistent_state() {
    let k = Arc::new(kernel(false).await);
    for _ in 0..3 {
        seed(&k, "t").await;
    }
    let query = CORPUS[0];
    let before = k.search("t", query, 4).await.unwrap();

    let searches: Vec<_> = (0..32)
        .map(|_| {
            let k = Arc::clone(&k);
            tokio::spawn(async move { k.search("t", query, 4).await })
        })
        .collect();
    let defrag = {
        let k = Arc::clone(&k);
        tokio::spawn(async move { k.defrag("t").await })
    };
    let observed: Vec<_> = futures::future::join_all(searches)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    assert_eq!(defrag.await.unwrap().unwrap().status, DefragStatus::Done);

    let after = k.search("t", query, 4).await.unwrap();
    assert_ne!(before, after);
    for hits in observed {
        assert!(hits == before || hits == after, "torn result: {hits:?}");
    }
}

#[tokio::test]
async fn test_defrag_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("data.db");
    {
        let k = file_kernel(&db, false).await;
        for text in ["one", "two", "one", "three", "two"] {
            k.add("t", text, ChunkMetadata::default()).await.unwrap();
        }
        assert_eq!(k.defrag("t").await.unwrap().status, DefragStatus::Done);
    }
    let k = file_kernel(&db, false).await;
    assert_eq!(texts(&k, "t").await, vec!["one", "two", "three"]);
    assert_eq!(k.defrag("t").await.unwrap().status, DefragStatus::Noop);
}

// ---------------------------------------------------------------------------
// Recovery and the best-effort dual write
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_restart_reproduces_memory() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("data.db");
    let query = "async tasks on a runtime";
    let before_hits;
    {
        let k = file_kernel(&db, false).await;
        seed(&k, "docs").await;
        k.update("faq", "where is the log?", "in sqlite").await.unwrap();
        before_hits = k.search("docs", query, 4).await.unwrap();
        assert_eq!(k.pending("docs").await.unwrap(), CORPUS.len());
    }

    let k = file_kernel(&db, false).await;
    assert_eq!(k.namespaces(), vec!["docs", "faq"]);
    assert_eq!(texts(&k, "docs").await, CORPUS.to_vec());
    assert_eq!(k.search("docs", query, 4).await.unwrap(), before_hits);
    // Replay never enqueues training work.
    assert_eq!(k.pending("docs").await.unwrap(), CORPUS.len());
    assert_eq!(k.pending("faq").await.unwrap(), 1);
    assert!(!k.stats("docs").await.unwrap().rebuild_required);
}

#[tokio::test]
async fn test_restart_with_another_model_flags_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("data.db");
    {
        let k = file_kernel_with_model(&db, "model-a").await;
        k.add("t", "hello world", ChunkMetadata::default())
            .await
            .unwrap();
        assert!(!k.stats("t").await.unwrap().rebuild_required);
    }
    {
        let k = file_kernel_with_model(&db, "model-b").await;
        let stats = k.stats("t").await.unwrap();
        assert_eq!(stats.size, 1);
        assert!(stats.rebuild_required);
        let exported = k.export("t").await.unwrap();
        assert_eq!(
            exported[0].metadata.model.as_deref(),
            Some("hashing/model-a-256")
        );
    }
    let k = file_kernel_with_model(&db, "model-a").await;
    assert!(!k.stats("t").await.unwrap().rebuild_required);
}

#[tokio::test]
async fn test_restart_recovers_autosave_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("data.db");
    {
        let k = file_kernel(&db, true).await;
        k.search("t", "remember me", 1).await.unwrap();
    }
    let k = file_kernel(&db, true).await;
    k.search("t", "remember me", 1).await.unwrap();
    assert_eq!(k.stats("t").await.unwrap().size, 1);
}

#[tokio::test]
async fn test_persistence_failure_leaves_memory_ahead_of_log() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let log = FlakyLog::new(substrate.chunks());
    let k = MemoryKernel::boot_with(
        config(false),
        log.clone(),
        Arc::new(substrate.training()),
        EncoderService::with_driver(hashing("test", DIMS)),
    )
    .await
    .unwrap();

    k.add("t", "durable fact", ChunkMetadata::default())
        .await
        .unwrap();
    log.fail_appends.store(true, Ordering::SeqCst);
    let err = k
        .add("t", "volatile fact", ChunkMetadata::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceError);

    // Visible immediately, not rolled back, not queued for training.
    let hits = k.search("t", "volatile fact", 1).await.unwrap();
    assert_eq!(hits[0].text, "volatile fact");
    assert_eq!(k.pending("t").await.unwrap(), 1);

    // A restart rebuilds from the log only.
    let restarted = kernel_over(&substrate, false).await;
    assert_eq!(texts(&restarted, "t").await, vec!["durable fact"]);
}

// ---------------------------------------------------------------------------
// Training queue
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_overlap() {
    let k = Arc::new(kernel(false).await);
    for i in 0..50 {
        k.update("t", &format!("question {i}"), &format!("answer {i}"))
            .await
            .unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let k = Arc::clone(&k);
            tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = k.claim("t", 7).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|s| s.id));
                }
                mine
            })
        })
        .collect();

    let mut all = Vec::new();
    for result in futures::future::join_all(handles).await {
        all.extend(result.unwrap());
    }
    let unique: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(all.len(), 50);
    assert_eq!(unique.len(), 50);
    assert_eq!(k.pending("t").await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_during_ingest_cover_every_sample_once() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let k = Arc::new(kernel_over(&substrate, false).await);
    let ingest_done = Arc::new(AtomicBool::new(false));

    let writer = {
        let k = Arc::clone(&k);
        let ingest_done = Arc::clone(&ingest_done);
        tokio::spawn(async move {
            for i in 0..40 {
                k.update("t", &format!("question {i}"), &format!("answer {i}"))
                    .await
                    .unwrap();
            }
            ingest_done.store(true, Ordering::SeqCst);
        })
    };

    let claimers: Vec<_> = (0..4)
        .map(|_| {
            let k = Arc::clone(&k);
            let ingest_done = Arc::clone(&ingest_done);
            tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let finished = ingest_done.load(Ordering::SeqCst);
                    let batch = k.claim("t", 5).await.unwrap();
                    if batch.is_empty() {
                        if finished {
                            break;
                        }
                        tokio::task::yield_now().await;
                        continue;
                    }
                    mine.extend(batch.into_iter().map(|s| s.id));
                }
                mine
            })
        })
        .collect();

    writer.await.unwrap();
    let mut claimed = Vec::new();
    for result in futures::future::join_all(claimers).await {
        claimed.extend(result.unwrap());
    }
    let unique: HashSet<i64> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 40);
    assert_eq!(unique.len(), 40);

    let enqueued: HashSet<i64> = substrate
        .training()
        .history("t")
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(unique, enqueued);
    assert_eq!(k.pending("t").await.unwrap(), 0);
}

#[tokio::test]
async fn test_claim_returns_oldest_first() {
    let substrate = MemorySubstrate::open_in_memory().unwrap();
    let k = kernel_over(&substrate, false).await;
    k.update("t", "first?", "1").await.unwrap();
    k.update("t", "second?", "2").await.unwrap();
    k.update("t", "third?", "3").await.unwrap();

    let batch = k.claim("t", 2).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch[0].text.starts_with("Q: first?"));
    assert!(batch[1].text.starts_with("Q: second?"));
    assert_eq!(substrate.training().pending_count("t").unwrap(), 1);
    assert_eq!(substrate.training().history("t").unwrap().len(), 3);
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_export_import_roundtrip() {
    let k = kernel(false).await;
    seed(&k, "src").await;

    for (format, dest) in [(ExportFormat::Json, "json"), (ExportFormat::MessagePack, "msgpack")] {
        let bytes = k.export_bytes("src", format).await.unwrap();
        let report = k.import_bytes(dest, &bytes, format).await.unwrap();
        assert_eq!(report.imported, CORPUS.len() as u64);
        assert!(report.errors.is_empty());
        assert_eq!(texts(&k, dest).await, texts(&k, "src").await);

        for query in ["borrow checker", "vector angles", "bread"] {
            let a: Vec<String> = k
                .search("src", query, 3)
                .await
                .unwrap()
                .into_iter()
                .map(|h| h.text)
                .collect();
            let b: Vec<String> = k
                .search(dest, query, 3)
                .await
                .unwrap()
                .into_iter()
                .map(|h| h.text)
                .collect();
            assert_eq!(a, b);
        }
    }
    // Imports are not training samples.
    assert_eq!(k.pending("json").await.unwrap(), 0);
}

#[tokio::test]
async fn test_import_skips_empty_and_tags_source() {
    let k = kernel(false).await;
    let items = vec![
        ExportItem {
            text: "kept".to_string(),
            metadata: ChunkMetadata::default(),
        },
        ExportItem {
            text: "   ".to_string(),
            metadata: ChunkMetadata::default(),
        },
        ExportItem {
            text: "tagged".to_string(),
            metadata: ChunkMetadata::with_source("manual"),
        },
    ];
    let report = k.import("t", items).await.unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 1);

    let exported = k.export("t").await.unwrap();
    assert_eq!(exported[0].metadata.source.as_deref(), Some(SOURCE_IMPORT));
    assert_eq!(exported[1].metadata.source.as_deref(), Some("manual"));
}

#[tokio::test]
async fn test_import_bad_bytes_is_serialization_error() {
    let k = kernel(false).await;
    let err = k
        .import_bytes("t", b"not json", ExportFormat::Json)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SerializationError);
}

// ---------------------------------------------------------------------------
// Encoder swap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_swap_to_new_dimension_rejects_mixed_vectors() {
    let k = kernel(false).await;
    seed(&k, "t").await;

    let report = k.swap_encoder(hashing("smaller", 32)).await;
    assert_eq!(report.generation, 2);
    assert_eq!(report.current_model, "hashing/smaller-32");

    let err = k
        .add("t", "new text", ChunkMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdctxError::DimensionMismatch {
            expected: DIMS,
            actual: 32,
            ..
        }
    ));
    assert_eq!(k.stats("t").await.unwrap().size, CORPUS.len());
    assert!(k.stats("t").await.unwrap().rebuild_required);

    // Fresh namespaces take the new dimension.
    k.add("fresh", "new text", ChunkMetadata::default())
        .await
        .unwrap();
    let stats = k.stats("fresh").await.unwrap();
    assert_eq!(stats.dimension, Some(32));
    assert!(!stats.rebuild_required);
}

#[tokio::test]
async fn test_swap_same_dimension_flags_rebuild() {
    let k = kernel(false).await;
    seed(&k, "t").await;
    assert!(!k.stats("t").await.unwrap().rebuild_required);

    k.swap_encoder(hashing("other-model", DIMS)).await;
    let stats = k.stats("t").await.unwrap();
    assert!(stats.rebuild_required);
    assert_eq!(stats.size, CORPUS.len());
    // Still searchable in the mixed space.
    assert!(!k.search("t", "rust", 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reload_encoder_rejects_invalid_settings() {
    let k = kernel(false).await;
    let settings = EmbeddingSettings {
        provider: "no-such-provider".to_string(),
        ..EmbeddingSettings::default()
    };
    let err = k.reload_encoder(&settings).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(k.encoder_generation(), 1);

    let settings = EmbeddingSettings {
        dimensions: DIMS,
        model: "reloaded".to_string(),
        ..EmbeddingSettings::default()
    };
    let report = k.reload_encoder(&settings).await.unwrap();
    assert_eq!(report.previous_model.as_deref(), Some("hashing/test-256"));
    assert_eq!(report.current_model, "hashing/reloaded-256");
}

// ---------------------------------------------------------------------------
// End-to-end scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hello_world_scenario() {
    let k = kernel(false).await;
    assert!(k.search("t", "anything", 4).await.unwrap().is_empty());

    k.add("t", "Q: Hello\nA: World", ChunkMetadata::default())
        .await
        .unwrap();
    let hits = k.search("t", "World", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.starts_with("Q: Hello"));

    k.add("t", "Q: Hello\nA: World", ChunkMetadata::default())
        .await
        .unwrap();
    assert_eq!(k.stats("t").await.unwrap().size, 2);
    let report = k.defrag("t").await.unwrap();
    assert_eq!(report.status, DefragStatus::Done);
    assert_eq!(k.stats("t").await.unwrap().size, 1);
}
