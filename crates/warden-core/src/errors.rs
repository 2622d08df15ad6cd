//! Shared error types.
//!
//! - [`SchemaError`]: the persisted document failed validation
//! - [`ClassifyError`]: the classifier could not produce a usable score
//! - [`PlatformError`]: a chat-platform action failed
//! - [`FailureClass`]: which handling policy a failure falls under

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The persisted ledger document is unreadable or structurally invalid.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Not valid JSON at all.
    #[error("document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Valid JSON, but the top level is not an object.
    #[error("document root must be an object")]
    NotAnObject,

    /// One of the three sections has the wrong shape.
    #[error("section `{section}` is invalid: {source}")]
    InvalidSection {
        /// Section name as it appears in the document.
        section: &'static str,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// The classifier failed to score a resource.
///
/// Every variant is handled the same way by enforcement: the attachment is
/// treated as clean and scanning moves on.
#[derive(Clone, Debug, Error)]
pub enum ClassifyError {
    /// The resource could not be fetched or decoded.
    #[error("resource unavailable: {0}")]
    Unavailable(String),

    /// The classifier backend returned an error.
    #[error("classifier backend failed: {0}")]
    Backend(String),

    /// The classifier returned something that is not a score in [0, 1].
    #[error("score out of range: {0}")]
    OutOfRange(f64),

    /// No answer within the bounded wait.
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),
}

/// A chat-platform side effect (delete, timeout, notify) failed.
#[derive(Clone, Debug, Error)]
pub enum PlatformError {
    /// The bot lacks the permission for this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The target no longer exists (message already deleted, member left).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other failure.
    #[error("platform error: {0}")]
    Other(String),
}

impl PlatformError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Other(_) => "other",
        }
    }
}

/// Handling policy for a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// External call failed; recorded and reported, never retried.
    Transient,
    /// The store could not be written; memory stays authoritative.
    Persistence,
    /// Persisted state was unreadable and replaced at load time.
    CorruptState,
    /// An administrator sent a bad command; nothing was changed.
    InvalidInput,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Persistence => write!(f, "persistence"),
            Self::CorruptState => write!(f, "corrupt_state"),
            Self::InvalidInput => write!(f, "invalid_input"),
        }
    }
}

impl From<&ClassifyError> for FailureClass {
    fn from(_: &ClassifyError) -> Self {
        Self::Transient
    }
}

impl From<&PlatformError> for FailureClass {
    fn from(_: &PlatformError) -> Self {
        Self::Transient
    }
}

impl From<&SchemaError> for FailureClass {
    fn from(_: &SchemaError) -> Self {
        Self::CorruptState
    }
}
