//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use dance_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// The job exists but is not in a state that allows the request.
    #[error("{0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Response detail; internal errors are masked in production.
    fn detail(&self, production: bool) -> String {
        match self {
            ApiError::Internal(_) if production => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::NotFound(_) => ApiError::not_found("Job not found"),
            WorkerError::NotReady { status, .. } => {
                ApiError::Conflict(format!("Analysis not completed. Current status: {}", status))
            }
            WorkerError::Validation(msg) => ApiError::Validation(msg),
            WorkerError::InvalidInput(msg) => ApiError::BadRequest(msg),
            WorkerError::ShuttingDown => ApiError::ServiceUnavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let ApiError::Internal(msg) = &self {
            error!("Internal error: {}", msg);
        }
        let detail = self.detail(is_production());

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

fn is_production() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|env| env.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dance_models::JobStatus;

    #[test]
    fn test_worker_errors_map_to_status_codes() {
        let cases = [
            (WorkerError::not_found("x"), StatusCode::NOT_FOUND),
            (
                WorkerError::NotReady {
                    job_id: "x".into(),
                    status: JobStatus::Processing,
                },
                StatusCode::CONFLICT,
            ),
            (WorkerError::validation("bad"), StatusCode::BAD_REQUEST),
            (WorkerError::invalid_input("empty"), StatusCode::BAD_REQUEST),
            (WorkerError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
            (WorkerError::ProcessingFailed("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_internal_detail_masked_in_production() {
        let err = ApiError::internal("disk full at /var/data");
        assert_eq!(err.detail(false), "Internal error: disk full at /var/data");
        assert_eq!(err.detail(true), "An internal error occurred");
        assert_eq!(ApiError::not_found("Job not found").detail(true), "Job not found");
    }

    #[test]
    fn test_not_ready_detail_names_status() {
        let err = ApiError::from(WorkerError::NotReady {
            job_id: "x".into(),
            status: JobStatus::Queued,
        });
        assert_eq!(err.to_string(), "Analysis not completed. Current status: queued");
    }
}
