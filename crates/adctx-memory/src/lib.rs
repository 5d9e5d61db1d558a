//! Vector memory engine for adctx.
//!
//! Provides the per-namespace in-memory similarity index and its durable
//! backing:
//! - **Vector index**: flat exact top-k over unit-normalized vectors
//! - **Namespace engine**: parallel text/metadata sequences plus the index,
//!   with content-hash dedup and compaction
//! - **Durable log** (SQLite): append-only chunk records and the training
//!   queue, replayed into engines at startup by the recovery loader
//!
//! Engines are plain data structures; locking and orchestration live in the
//! kernel.

pub mod chunks;
pub mod engine;
pub mod index;
pub mod log;
pub mod migration;
pub mod noise;
pub mod recovery;
pub mod training;

mod substrate;
pub use substrate::MemorySubstrate;
