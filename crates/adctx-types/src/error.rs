//! Shared error types for the adctx memory store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the memory store.
#[derive(Error, Debug)]
pub enum AdctxError {
    /// The request was rejected before any mutation (bad `k`, empty text,
    /// malformed namespace).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding function failed or is not ready.
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// An embedding disagrees with the namespace's established dimension.
    #[error("Dimension mismatch in namespace '{namespace}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The namespace whose dimension was violated.
        namespace: String,
        /// The dimension already established for the namespace.
        expected: usize,
        /// The dimension of the rejected embedding.
        actual: usize,
    },

    /// A durable log call failed. In-memory state is not rolled back.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred (lock poisoning, task join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    EncoderUnavailable,
    DimensionMismatch,
    PersistenceError,
    SerializationError,
    ConfigError,
    Internal,
}

/// A structured failure: the error kind plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub reason: String,
}

impl AdctxError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdctxError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AdctxError::EncoderUnavailable(_) => ErrorKind::EncoderUnavailable,
            AdctxError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            AdctxError::Persistence(_) => ErrorKind::PersistenceError,
            AdctxError::Serialization(_) => ErrorKind::SerializationError,
            AdctxError::Config(_) => ErrorKind::ConfigError,
            AdctxError::Io(_) | AdctxError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Render this error as a structured report.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            reason: self.to_string(),
        }
    }
}

/// Alias for Result with AdctxError.
pub type AdctxResult<T> = Result<T, AdctxError>;
