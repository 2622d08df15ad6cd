//! Store error types.

use thiserror::Error;
use warden_core::FailureClass;

/// Errors raised while writing the ledger document.
///
/// Reads never surface an error: an unreadable document is recovered at load
/// time (see [`crate::store::JsonFileStore`]).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The temporary file could not be moved over the target.
    #[error("failed to replace {path}: {source}")]
    Replace {
        /// Target document path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The blocking write task panicked or was cancelled.
    #[error("write task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Store failures are never fatal; memory stays authoritative.
    pub fn failure_class(&self) -> FailureClass {
        FailureClass::Persistence
    }
}
