//! Error types for detection operations.

use divergence_core::StoreError;
use thiserror::Error;

/// Errors that abort a detection pass.
///
/// Price source failures are not listed here: they are logged and the pass
/// yields no findings.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
