//! Core types for the adctx semantic memory store.
//!
//! This crate defines the data model shared by the memory engine, the
//! embedding runtime, and the kernel: chunks, training samples, search hits,
//! defrag reports, configuration, and the error taxonomy. It contains no
//! business logic.

pub mod config;
pub mod error;
pub mod memory;
