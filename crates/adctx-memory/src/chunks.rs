//! SQLite chunk log.
//!
//! One row per memorized unit: namespace, text, embedding as a
//! little-endian f32 BLOB, optional JSON metadata, RFC 3339 timestamp.

use crate::log::DurableLog;
use adctx_types::error::{AdctxError, AdctxResult};
use adctx_types::memory::{Chunk, ChunkMetadata, NewChunk};
use chrono::Utc;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Chunk log backed by SQLite.
#[derive(Clone)]
pub struct ChunkStore {
    conn: Arc<Mutex<Connection>>,
}

impl ChunkStore {
    /// Create a new chunk store wrapping the given connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

/// Decode a metadata blob. An undecodable blob yields empty metadata, which
/// drops its `hash` and `model`, so it is logged.
fn decode_metadata(id: i64, raw: Option<&str>) -> ChunkMetadata {
    let Some(raw) = raw else {
        return ChunkMetadata::default();
    };
    match serde_json::from_str(raw) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(chunk_id = id, error = %e, "Undecodable chunk metadata, using defaults");
            ChunkMetadata::default()
        }
    }
}

fn insert_chunk(
    conn: &Connection,
    namespace: &str,
    text: &str,
    embedding: &[f32],
    metadata: &ChunkMetadata,
    created_at: &str,
) -> AdctxResult<i64> {
    let meta_str = if metadata.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(metadata)
                .map_err(|e| AdctxError::Serialization(e.to_string()))?,
        )
    };
    conn.execute(
        "INSERT INTO chunks (ns, text, embedding, meta, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            namespace,
            text,
            embedding_to_bytes(embedding),
            meta_str,
            created_at
        ],
    )
    .map_err(|e| AdctxError::Persistence(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

fn insert_all(conn: &Connection, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>> {
    let now = Utc::now().to_rfc3339();
    chunks
        .iter()
        .map(|c| insert_chunk(conn, namespace, &c.text, &c.embedding, &c.metadata, &now))
        .collect()
}

impl DurableLog for ChunkStore {
    fn append(
        &self,
        namespace: &str,
        text: &str,
        embedding: &[f32],
        metadata: &ChunkMetadata,
    ) -> AdctxResult<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        insert_chunk(&conn, namespace, text, embedding, metadata, &now)
    }

    fn bulk_append(&self, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        let ids = insert_all(&tx, namespace, chunks)?;
        tx.commit()
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        Ok(ids)
    }

    fn stream(&self, namespace: &str) -> AdctxResult<Vec<Chunk>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, ns, text, embedding, meta, created_at
                 FROM chunks WHERE ns = ?1 ORDER BY id ASC",
            )
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;

        let rows = stmt
            .query_map(rusqlite::params![namespace], |row| {
                let id: i64 = row.get(0)?;
                let ns: String = row.get(1)?;
                let text: String = row.get(2)?;
                let embedding_bytes: Vec<u8> = row.get(3)?;
                let meta_str: Option<String> = row.get(4)?;
                let created_str: String = row.get(5)?;
                Ok((id, ns, text, embedding_bytes, meta_str, created_str))
            })
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;

        let mut chunks = Vec::new();
        for row_result in rows {
            let (id, ns, text, embedding_bytes, meta_str, created_str) =
                row_result.map_err(|e| AdctxError::Persistence(e.to_string()))?;

            if embedding_bytes.len() % 4 != 0 {
                return Err(AdctxError::Persistence(format!(
                    "chunk {id} has a truncated embedding ({} bytes)",
                    embedding_bytes.len()
                )));
            }
            let metadata = decode_metadata(id, meta_str.as_deref());
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            chunks.push(Chunk {
                id,
                namespace: ns,
                text,
                embedding: embedding_from_bytes(&embedding_bytes),
                metadata,
                created_at,
            });
        }
        debug!(namespace, count = chunks.len(), "Streamed chunks");
        Ok(chunks)
    }

    fn namespaces(&self) -> AdctxResult<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ns FROM chunks ORDER BY ns")
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AdctxError::Persistence(e.to_string()))
    }

    fn delete_namespace(&self, namespace: &str) -> AdctxResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        conn.execute(
            "DELETE FROM chunks WHERE ns = ?1",
            rusqlite::params![namespace],
        )
        .map_err(|e| AdctxError::Persistence(e.to_string()))
    }

    fn replace_namespace(&self, namespace: &str, chunks: &[NewChunk]) -> AdctxResult<Vec<i64>> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        let removed = tx
            .execute(
                "DELETE FROM chunks WHERE ns = ?1",
                rusqlite::params![namespace],
            )
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        let ids = insert_all(&tx, namespace, chunks)?;
        tx.commit()
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        debug!(
            namespace,
            removed,
            inserted = ids.len(),
            "Replaced namespace chunks"
        );
        Ok(ids)
    }
}

/// Serialize embedding to bytes for SQLite BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Deserialize embedding from bytes.
pub fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
