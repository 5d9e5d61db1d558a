//! Kernel-specific error types.

use adctx_types::error::AdctxError;
use thiserror::Error;

/// Kernel error type wrapping AdctxError with kernel-specific context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped AdctxError.
    #[error(transparent)]
    Adctx(#[from] AdctxError),

    /// The kernel failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
