//! MemorySubstrate: one SQLite connection shared by the chunk log and the
//! training queue.

use crate::chunks::ChunkStore;
use crate::migration::run_migrations;
use crate::training::TrainingQueue;
use adctx_types::error::{AdctxError, AdctxResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// The durable half of the memory system.
#[derive(Clone)]
pub struct MemorySubstrate {
    chunks: ChunkStore,
    training: TrainingQueue,
}

impl MemorySubstrate {
    /// Open or create a database at the given path and bring its schema
    /// up to date.
    pub fn open(db_path: &Path) -> AdctxResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).map_err(|e| AdctxError::Persistence(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        run_migrations(&conn).map_err(|e| AdctxError::Persistence(e.to_string()))?;
        info!(path = %db_path.display(), "Opened memory database");
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory substrate (for testing).
    pub fn open_in_memory() -> AdctxResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| AdctxError::Persistence(e.to_string()))?;
        run_migrations(&conn).map_err(|e| AdctxError::Persistence(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let shared = Arc::new(Mutex::new(conn));
        Self {
            chunks: ChunkStore::new(Arc::clone(&shared)),
            training: TrainingQueue::new(shared),
        }
    }

    /// The chunk log.
    pub fn chunks(&self) -> ChunkStore {
        self.chunks.clone()
    }

    /// The training queue.
    pub fn training(&self) -> TrainingQueue {
        self.training.clone()
    }
}
