use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::metrics_middleware;
use super::{batch, handlers, review};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/placeholders", post(handlers::placeholders))
        // Batch session
        .route("/batch", post(batch::start_batch))
        .route("/batch", get(batch::get_batch))
        .route("/batch/cancel", post(batch::cancel_batch))
        .route("/batch/errors", get(batch::get_errors))
        // Review
        .route("/batch/review", get(review::get_review))
        .route("/batch/review/approve", post(review::approve))
        .route("/batch/review/reject", post(review::reject))
        .route("/batch/review/preview", get(review::preview))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
}
