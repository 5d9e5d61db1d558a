//! Training queue: durable FIFO of fresh samples for the external trainer.
//!
//! Samples are never deleted. `claim` flips a batch from `pending` to
//! `consumed` inside one immediate transaction, so concurrent claims never
//! hand out the same sample twice.

use crate::log::SampleQueue;
use adctx_types::error::{AdctxError, AdctxResult};
use adctx_types::memory::{SampleState, TrainingSample};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Training queue backed by SQLite.
#[derive(Clone)]
pub struct TrainingQueue {
    conn: Arc<Mutex<Connection>>,
}

impl TrainingQueue {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Every sample of a namespace, pending and consumed, oldest first.
    pub fn history(&self, namespace: &str) -> AdctxResult<Vec<TrainingSample>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, ns, text, state, created_at FROM train_queue
                 WHERE ns = ?1 ORDER BY id ASC",
            )
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![namespace], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;

        let mut samples = Vec::new();
        for row in rows {
            let (id, ns, text, state_str, created_str) =
                row.map_err(|e| AdctxError::Persistence(e.to_string()))?;
            let state = SampleState::parse(&state_str).ok_or_else(|| {
                AdctxError::Persistence(format!("sample {id} has unknown state '{state_str}'"))
            })?;
            samples.push(TrainingSample {
                id,
                namespace: ns,
                text,
                state,
                created_at: parse_timestamp(&created_str),
            });
        }
        Ok(samples)
    }
}

fn parse_timestamp(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SampleQueue for TrainingQueue {
    fn enqueue(&self, namespace: &str, text: &str) -> AdctxResult<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO train_queue (ns, text, state, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                namespace,
                text,
                SampleState::Pending.as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    fn claim(&self, namespace: &str, max_batch: usize) -> AdctxResult<Vec<TrainingSample>> {
        if max_batch == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;

        let mut batch = Vec::new();
        {
            let mut stmt = tx
                .prepare(
                    "SELECT id, ns, text, created_at FROM train_queue
                     WHERE ns = ?1 AND state = 'pending'
                     ORDER BY id ASC LIMIT ?2",
                )
                .map_err(|e| AdctxError::Persistence(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![namespace, max_batch as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| AdctxError::Persistence(e.to_string()))?;
            for row in rows {
                let (id, ns, text, created_str) =
                    row.map_err(|e| AdctxError::Persistence(e.to_string()))?;
                batch.push(TrainingSample {
                    id,
                    namespace: ns,
                    text,
                    state: SampleState::Consumed,
                    created_at: parse_timestamp(&created_str),
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        for sample in &batch {
            tx.execute(
                "UPDATE train_queue SET state = 'consumed', consumed_at = ?1
                 WHERE id = ?2 AND state = 'pending'",
                rusqlite::params![now, sample.id],
            )
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;

        debug!(namespace, claimed = batch.len(), "Claimed training batch");
        Ok(batch)
    }

    fn pending_count(&self, namespace: &str) -> AdctxResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdctxError::Internal(e.to_string()))?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM train_queue WHERE ns = ?1 AND state = 'pending'",
                rusqlite::params![namespace],
                |row| row.get(0),
            )
            .map_err(|e| AdctxError::Persistence(e.to_string()))?;
        Ok(count as usize)
    }
}
