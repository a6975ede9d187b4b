use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use pixbatch_core::{extract_placeholders, Config};

use crate::metrics::encode_metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        engine: state.engine().name().to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config().clone())
}

pub async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

#[derive(Debug, Deserialize)]
pub struct PlaceholdersBody {
    pub script: String,
}

#[derive(Debug, Serialize)]
pub struct PlaceholdersResponse {
    pub placeholders: Vec<u32>,
}

/// Lists the placeholders a script references, so a client can ask for
/// one file list per index before starting a batch.
pub async fn placeholders(Json(body): Json<PlaceholdersBody>) -> Json<PlaceholdersResponse> {
    Json(PlaceholdersResponse {
        placeholders: extract_placeholders(&body.script),
    })
}
