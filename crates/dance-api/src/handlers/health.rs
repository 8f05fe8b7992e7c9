//! Service info and health handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Service description and endpoint map.
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Dance Movement Analysis API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "/api/v1/analyze",
            "status": "/api/v1/status/{job_id}",
            "download": "/api/v1/download/{job_id}",
            "results": "/api/v1/results/{job_id}",
            "keypoints": "/api/v1/keypoints/{job_id}",
            "jobs": "/api/v1/jobs",
            "health": "/health"
        }
    }))
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub active_jobs: usize,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        active_jobs: state.executor.active_jobs().await,
    })
}
