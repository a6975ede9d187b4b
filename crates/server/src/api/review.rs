//! Review API handlers.
//!
//! Decisions always target the item on screen when the request is handled;
//! a decision that races with the next pull is dropped by the reviewer.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use pixbatch_core::{EngineError, JobState, ReviewDecision, ReviewItem, ReviewTally};

use super::batch::{error_response, no_batch};
use crate::metrics::REFUSED_DECISIONS_TOTAL;
use crate::state::AppState;

/// Default preview viewport edge in pixels
const DEFAULT_PREVIEW_SIZE: u32 = 512;

/// Largest preview viewport edge in pixels
const MAX_PREVIEW_SIZE: u32 = 4096;

// ============================================================================
// Request/Response Types
// ============================================================================

/// The item currently awaiting a decision
#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub job_id: String,
    pub state: JobState,
    pub item: ReviewItem,
    pub reviewed: ReviewTally,
}

/// Acknowledgement of a forwarded decision
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub artifact_path: PathBuf,
    pub decision: ReviewDecision,
}

/// Query parameters for a preview
#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the item awaiting review
pub async fn get_review(State(state): State<Arc<AppState>>) -> Response {
    let Some(session) = state.session().await else {
        return no_batch().into_response();
    };
    let job = session.coordinator.snapshot();
    match job.current_review {
        Some(item) => Json(ReviewResponse {
            job_id: job.id,
            state: job.state,
            item,
            reviewed: job.reviewed,
        })
        .into_response(),
        None => {
            error_response(StatusCode::NOT_FOUND, "no item is awaiting review").into_response()
        }
    }
}

/// Approve the item on screen
pub async fn approve(State(state): State<Arc<AppState>>) -> Response {
    decide(&state, ReviewDecision::Approve).await
}

/// Reject the item on screen
pub async fn reject(State(state): State<Arc<AppState>>) -> Response {
    decide(&state, ReviewDecision::Reject).await
}

fn refuse(reason: &str, message: &str) -> Response {
    REFUSED_DECISIONS_TOTAL.with_label_values(&[reason]).inc();
    debug!("Refusing review decision: {}", message);
    error_response(StatusCode::CONFLICT, message).into_response()
}

async fn decide(state: &AppState, decision: ReviewDecision) -> Response {
    let Some(session) = state.session().await else {
        return no_batch().into_response();
    };
    let Some(decisions) = session.decisions else {
        return refuse("review_disabled", "review is not enabled for this batch");
    };
    let Some(item) = session.coordinator.snapshot().current_review else {
        return refuse("not_presenting", "no item is awaiting review");
    };

    if decisions
        .send_for(item.artifact_path.clone(), decision)
        .await
        .is_err()
    {
        return refuse("closed", "review session is closed");
    }

    (
        StatusCode::ACCEPTED,
        Json(DecisionResponse {
            artifact_path: item.artifact_path,
            decision,
        }),
    )
        .into_response()
}

/// Render the item on screen as a PNG scaled to fit the viewport
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> Response {
    let Some(session) = state.session().await else {
        return no_batch().into_response();
    };

    let width = params.width.unwrap_or(DEFAULT_PREVIEW_SIZE);
    let height = params.height.unwrap_or(DEFAULT_PREVIEW_SIZE);
    if width > MAX_PREVIEW_SIZE || height > MAX_PREVIEW_SIZE {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("preview viewport is limited to {0}x{0}", MAX_PREVIEW_SIZE),
        )
        .into_response();
    }

    match session.coordinator.preview_current(width, height).await {
        Ok(Some(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(None) => {
            error_response(StatusCode::NOT_FOUND, "no item is awaiting review").into_response()
        }
        Err(e) => {
            let status = match &e {
                EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                EngineError::ArtifactNotFound { .. } | EngineError::NoActiveBatch => {
                    StatusCode::NOT_FOUND
                }
                _ => {
                    warn!("Preview failed: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            error_response(status, e.to_string()).into_response()
        }
    }
}
