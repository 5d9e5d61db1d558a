//! Recovery loader: rebuilds namespace engines from the durable log.
//!
//! Persisted embeddings are reused verbatim and no training samples are
//! enqueued. A namespace is only handed back once it is fully replayed.
//! Rows the engine rejects are left in the log and counted on the engine,
//! which then refuses to be rewritten over them.

use crate::engine::NamespaceEngine;
use crate::log::DurableLog;
use adctx_types::error::AdctxResult;
use tracing::{info, warn};

/// Outcome of replaying one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub namespace: String,
    pub loaded: usize,
    /// Rows rejected by the engine (dimension drift, empty vectors).
    pub skipped: usize,
}

/// Replay every chunk of `namespace`, by ascending id, into a fresh engine.
pub fn replay_namespace(
    log: &dyn DurableLog,
    namespace: &str,
) -> AdctxResult<(NamespaceEngine, ReplayStats)> {
    let chunks = log.stream(namespace)?;
    let mut engine = NamespaceEngine::new(namespace);
    let mut skipped = 0;

    for chunk in chunks {
        let id = chunk.id;
        if let Err(e) = engine.append(chunk.text, &chunk.embedding, chunk.metadata) {
            warn!(namespace, chunk_id = id, error = %e, "Skipping unreplayable chunk");
            engine.note_unreplayed();
            skipped += 1;
        }
    }

    let stats = ReplayStats {
        namespace: namespace.to_string(),
        loaded: engine.len(),
        skipped,
    };
    info!(
        namespace,
        loaded = stats.loaded,
        skipped = stats.skipped,
        dimension = ?engine.dimension(),
        "Replayed namespace"
    );
    if skipped > 0 {
        warn!(
            namespace,
            skipped, "Namespace only partially recovered, rebuild required"
        );
    }
    Ok((engine, stats))
}

/// Replay every namespace known to the log. Each engine is yielded to
/// `install` only after its replay has finished.
pub fn recover_all<F>(log: &dyn DurableLog, mut install: F) -> AdctxResult<Vec<ReplayStats>>
where
    F: FnMut(NamespaceEngine),
{
    let namespaces = log.namespaces()?;
    let mut all = Vec::with_capacity(namespaces.len());
    for namespace in namespaces {
        let (engine, stats) = replay_namespace(log, &namespace)?;
        install(engine);
        all.push(stats);
    }
    Ok(all)
}
