//! Axum HTTP API server for dance video analysis.
//!
//! This crate provides:
//! - Upload, status, download and result endpoints over the job executor
//! - Per-IP rate limiting, request ids and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
