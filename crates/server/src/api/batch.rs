//! Batch API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use pixbatch_core::{
    BatchError, BatchJob, FileError, JobState, PlaceholderBinding, ReviewItem, ReviewTally,
};

use crate::state::{AppState, BatchSpec};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a batch
#[derive(Debug, Deserialize)]
pub struct StartBatchBody {
    pub script: String,
    #[serde(default)]
    pub output_directory: String,
    /// Input files per placeholder index, in selection order
    #[serde(default)]
    pub bindings: BTreeMap<u32, Vec<PathBuf>>,
    #[serde(default)]
    pub review_enabled: bool,
}

/// Snapshot of the session's batch job
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub state: JobState,
    pub script: String,
    pub output_directory: Option<PathBuf>,
    pub bindings: Vec<PlaceholderBinding>,
    pub review_enabled: bool,
    pub progress: f64,
    pub errors: Vec<FileError>,
    pub failure: Option<String>,
    pub cancel_reason: Option<String>,
    pub current_review: Option<ReviewItem>,
    pub reviewed: ReviewTally,
    pub created_at: String,
    pub submitted_at: Option<String>,
    pub finished_at: Option<String>,
}

impl From<BatchJob> for JobResponse {
    fn from(job: BatchJob) -> Self {
        Self {
            errors: job.error_list(),
            id: job.id,
            state: job.state,
            script: job.script,
            output_directory: job.output_directory,
            bindings: job.bindings,
            review_enabled: job.review_enabled,
            progress: job.progress,
            failure: job.failure,
            cancel_reason: job.cancel_reason,
            current_review: job.current_review,
            reviewed: job.reviewed,
            created_at: job.created_at.to_rfc3339(),
            submitted_at: job.submitted_at.map(|t| t.to_rfc3339()),
            finished_at: job.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Per-file errors of the session's batch
#[derive(Debug, Serialize)]
pub struct ErrorsResponse {
    pub state: JobState,
    pub errors: Vec<FileError>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn no_batch() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "no batch has run in this session".to_string(),
        }),
    )
}

fn batch_error_status(error: &BatchError) -> StatusCode {
    if error.is_configuration_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CONFLICT
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Configure and submit a batch
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartBatchBody>,
) -> Result<(StatusCode, Json<JobResponse>), impl IntoResponse> {
    let spec = BatchSpec {
        script: body.script,
        output_directory: body.output_directory,
        bindings: body
            .bindings
            .into_iter()
            .map(|(index, files)| PlaceholderBinding::new(index, files))
            .collect(),
        review_enabled: body.review_enabled,
    };

    match state.start_batch(spec).await {
        Ok(job) => Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job)))),
        Err(e) => {
            warn!("Batch refused: {}", e);
            Err(error_response(batch_error_status(&e), e.to_string()))
        }
    }
}

/// Get the session's batch
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.session().await {
        Some(session) => Ok(Json(JobResponse::from(session.coordinator.snapshot()))),
        None => Err(no_batch()),
    }
}

/// Cancel the session's batch. Cancelling a finished batch changes nothing.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    let Some(session) = state.session().await else {
        return Err(no_batch());
    };
    session.coordinator.cancel();
    Ok(Json(JobResponse::from(session.coordinator.snapshot())))
}

/// Per-file errors, filled in once the batch completes
pub async fn get_errors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ErrorsResponse>, impl IntoResponse> {
    let Some(session) = state.session().await else {
        return Err(no_batch());
    };
    let job = session.coordinator.snapshot();
    Ok(Json(ErrorsResponse {
        state: job.state,
        errors: job.error_list(),
    }))
}
