//! Types for batch orchestration.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binder::{BindingError, PlaceholderBinding};
use crate::engine::FileErrors;

/// Errors returned to the caller of the batch coordinator.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A placeholder binding is missing or does not belong to the script.
    #[error("invalid bindings: {0}")]
    Binding(#[from] BindingError),

    /// No output directory was chosen.
    #[error("output directory is required")]
    MissingOutputDirectory,

    /// The script is empty.
    #[error("script is empty")]
    EmptyScript,

    /// Review was requested without anyone to review.
    #[error("review is enabled but no reviewer was provided")]
    MissingReviewer,

    /// A binding targets an index the script never references.
    #[error("script has no placeholder ${0}")]
    UnknownPlaceholder(u32),

    /// A batch is already submitted or running in this session.
    #[error("a batch job is already in flight")]
    JobInFlight,

    /// The job is not in a state that allows the operation.
    #[error("invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl BatchError {
    /// Whether the error is a configuration problem the user can fix
    /// before submitting again.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Binding(_)
                | Self::MissingOutputDirectory
                | Self::EmptyScript
                | Self::MissingReviewer
                | Self::UnknownPlaceholder(_)
        )
    }
}

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Bindings are being collected; the engine has not been contacted.
    Configuring,
    /// Validated and handed to the driver.
    Submitted,
    /// The engine is working on the batch.
    Running,
    /// An output is on screen awaiting a human decision.
    Reviewing,
    /// The submission resolved, possibly with per-file errors.
    Completed,
    /// The caller or reviewer cancelled the job.
    Cancelled,
    /// The submission itself failed.
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuring => "configuring",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Submitted and not yet finished.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitted | Self::Running | Self::Reviewing)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision recorded on a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemDecision {
    Approved,
    Rejected,
}

/// One output on screen for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Engine identifier of the output (its staged path).
    pub artifact_path: PathBuf,
    /// Unset until the reviewer decides.
    pub decision: Option<ItemDecision>,
    /// When the item was pulled from the engine.
    pub presented_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn new(artifact_path: PathBuf) -> Self {
        Self {
            artifact_path,
            decision: None,
            presented_at: Utc::now(),
        }
    }
}

/// Decisions taken so far in a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTally {
    pub approved: usize,
    pub rejected: usize,
}

/// One failed output of a completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

/// A batch job and everything observed about it so far.
///
/// Callers only ever see clones; the coordinator and its review gate are
/// the only writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub script: String,
    pub output_directory: Option<PathBuf>,
    pub bindings: Vec<PlaceholderBinding>,
    pub review_enabled: bool,
    pub state: JobState,
    /// Fraction of the batch processed, in `[0, 1]`.
    pub progress: f64,
    /// Per-file errors; filled in only when the job completes.
    pub errors: FileErrors,
    /// Fatal submission error, set only in `Failed`.
    pub failure: Option<String>,
    /// Why the job was cancelled, when it was not the caller.
    pub cancel_reason: Option<String>,
    pub current_review: Option<ReviewItem>,
    pub reviewed: ReviewTally,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn new(script: impl Into<String>, bindings: Vec<PlaceholderBinding>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            script: script.into(),
            output_directory: None,
            bindings,
            review_enabled: false,
            state: JobState::Configuring,
            progress: 0.0,
            errors: FileErrors::new(),
            failure: None,
            cancel_reason: None,
            current_review: None,
            reviewed: ReviewTally::default(),
            created_at: Utc::now(),
            submitted_at: None,
            finished_at: None,
        }
    }

    /// Per-file errors as a flat list.
    pub fn error_list(&self) -> Vec<FileError> {
        self.errors
            .iter()
            .map(|(file, message)| FileError {
                file: file.clone(),
                message: message.clone(),
            })
            .collect()
    }

    /// The terminal outcome, once there is one.
    pub fn outcome(&self) -> Option<BatchOutcome> {
        match self.state {
            JobState::Completed => Some(BatchOutcome::Completed(BatchReport {
                errors: self.errors.clone(),
            })),
            JobState::Cancelled => Some(BatchOutcome::Cancelled {
                reason: self.cancel_reason.clone(),
            }),
            JobState::Failed => Some(BatchOutcome::Failed {
                message: self.failure.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// Per-file results of a completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub errors: FileErrors,
}

impl BatchReport {
    /// No file failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_list(&self) -> Vec<FileError> {
        self.errors
            .iter()
            .map(|(file, message)| FileError {
                file: file.clone(),
                message: message.clone(),
            })
            .collect()
    }
}

/// How a batch job ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The submission resolved. Per-file errors do not make a job fail.
    Completed(BatchReport),
    /// Stopped before completion; `reason` is set for automatic cancels.
    Cancelled { reason: Option<String> },
    /// The submission itself failed.
    Failed { message: String },
}

impl BatchOutcome {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(report) if report.is_clean() => "completed",
            Self::Completed(_) => "completed_with_errors",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_flags() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Reviewing.is_terminal());

        assert!(JobState::Running.is_in_flight());
        assert!(JobState::Reviewing.is_in_flight());
        assert!(!JobState::Configuring.is_in_flight());
        assert!(!JobState::Completed.is_in_flight());
    }

    #[test]
    fn test_job_state_serialization() {
        let json = serde_json::to_string(&JobState::Reviewing).unwrap();
        assert_eq!(json, "\"reviewing\"");
    }

    #[test]
    fn test_new_job_is_configuring() {
        let job = BatchJob::new("invert($1)", vec![PlaceholderBinding::empty(1)]);
        assert_eq!(job.state, JobState::Configuring);
        assert_eq!(job.progress, 0.0);
        assert!(job.outcome().is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_outcome_labels() {
        let mut errors = FileErrors::new();
        assert_eq!(
            BatchOutcome::Completed(BatchReport {
                errors: errors.clone()
            })
            .label(),
            "completed"
        );

        errors.insert("img3.png".to_string(), "decode failed".to_string());
        let report = BatchReport { errors };
        assert!(!report.is_clean());
        assert_eq!(
            report.error_list(),
            vec![FileError {
                file: "img3.png".to_string(),
                message: "decode failed".to_string(),
            }]
        );
        assert_eq!(
            BatchOutcome::Completed(report).label(),
            "completed_with_errors"
        );
        assert_eq!(
            BatchOutcome::Failed {
                message: "engine unavailable".to_string()
            }
            .label(),
            "failed"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(BatchError::MissingOutputDirectory.is_configuration_error());
        assert!(BatchError::Binding(BindingError::MissingBinding(2)).is_configuration_error());
        assert!(!BatchError::JobInFlight.is_configuration_error());

        let err = BatchError::InvalidState {
            expected: "configuring".to_string(),
            actual: "running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid job state: expected configuring, got running"
        );
    }
}
