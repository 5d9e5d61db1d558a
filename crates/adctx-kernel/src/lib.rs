//! Core kernel for the adctx semantic memory store.
//!
//! The kernel owns one engine per namespace, the process-wide encoder, and
//! the durable log, and exposes the ingest, search, compaction and training
//! hand-off operations.

pub mod config;
pub mod encoder;
pub mod error;
pub mod kernel;

pub use encoder::{EncoderService, SwapReport};
pub use kernel::MemoryKernel;
