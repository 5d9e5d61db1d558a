//! Durable log abstraction: the system of record behind the in-memory
//! engines.
//!
//! All calls fail with `AdctxError::Persistence`. Implementations must
//! assign strictly increasing ids and stream chunks in id order.

use adctx_types::error::AdctxResult;
use adctx_types::memory::{Chunk, ChunkMetadata, NewChunk, TrainingSample};

/// Append-only chunk log, queryable by namespace.
pub trait DurableLog: Send + Sync {
    /// Append one chunk and return its id.
    fn append(
        &self,
        namespace: &str,
        text: &str,
        embedding: &[f32],
        metadata: &ChunkMetadata,
    ) -> AdctxResult<i64>;

    /// Append several chunks in order; returns their ids.
    fn bulk_append(&self, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>>;

    /// All chunks of a namespace by ascending id.
    fn stream(&self, namespace: &str) -> AdctxResult<Vec<Chunk>>;

    /// Every namespace with at least one chunk.
    fn namespaces(&self) -> AdctxResult<Vec<String>>;

    /// Remove every chunk of a namespace. Returns the number removed.
    fn delete_namespace(&self, namespace: &str) -> AdctxResult<usize>;

    /// Replace a namespace's chunks with `chunks`, in order.
    ///
    /// The default runs delete then insert; implementations with
    /// transactions should make the pair atomic.
    fn replace_namespace(&self, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>> {
        self.delete_namespace(namespace)?;
        self.bulk_append(namespace, chunks)
    }
}

/// Durable FIFO of training samples.
pub trait SampleQueue: Send + Sync {
    /// Append one pending sample; returns its id.
    fn enqueue(&self, namespace: &str, text: &str) -> AdctxResult<i64>;

    /// Atomically take up to `max_batch` pending samples of a namespace,
    /// oldest first, and mark them consumed.
    fn claim(&self, namespace: &str, max_batch: usize) -> AdctxResult<Vec<TrainingSample>>;

    /// Number of pending samples in a namespace.
    fn pending_count(&self, namespace: &str) -> AdctxResult<usize>;
}
