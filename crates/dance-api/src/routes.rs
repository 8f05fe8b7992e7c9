//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    analyze, delete_job, download_video, get_keypoints, get_results, get_status, health,
    list_jobs, root,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(ClientRateLimiter::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .route("/analyze", post(analyze))
        .route("/status/:job_id", get(get_status))
        .route("/download/:job_id", get(download_video))
        .route("/results/:job_id", get(get_results))
        .route("/keypoints/:job_id", get(get_keypoints))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", delete(delete_job))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api_routes)
        .merge(metrics_routes)
        // Uploads are bounded by the configured limit, not the extractor default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
