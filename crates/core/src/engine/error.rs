//! Error types for the execution engine contract.

use std::path::PathBuf;
use thiserror::Error;

/// Errors an execution engine can report.
///
/// These are faults of the engine call itself. Failures of individual
/// files are never reported here; they travel in the `FileErrors` map
/// returned by a completed submission.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot be reached or is not running.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine refused the request as malformed.
    #[error("invalid batch request: {0}")]
    InvalidRequest(String),

    /// Another batch is already running on this engine.
    #[error("a batch is already running")]
    Busy,

    /// A review operation was issued while no batch is active.
    #[error("no active batch")]
    NoActiveBatch,

    /// A decision was issued with no item at the front of the review queue.
    #[error("no review item is pending")]
    NoPendingItem,

    /// The artifact to preview does not exist.
    #[error("artifact not found: {path}")]
    ArtifactNotFound { path: PathBuf },

    /// The artifact could not be decoded or re-encoded for preview.
    #[error("preview failed: {reason}")]
    PreviewFailed { reason: String },

    /// I/O error while staging or publishing outputs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn preview_failed(reason: impl Into<String>) -> Self {
        Self::PreviewFailed {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Busy | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::unavailable("down").is_retryable());
        assert!(EngineError::Busy.is_retryable());
        assert!(!EngineError::invalid_request("bad").is_retryable());
        assert!(!EngineError::NoPendingItem.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::ArtifactNotFound {
            path: PathBuf::from("/tmp/out.png"),
        };
        assert_eq!(err.to_string(), "artifact not found: /tmp/out.png");
        assert_eq!(
            EngineError::unavailable("connection refused").to_string(),
            "engine unavailable: connection refused"
        );
    }
}
