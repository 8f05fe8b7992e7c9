//! Worker error types.

use thiserror::Error;

use dance_media::MediaError;
use dance_models::{JobStatus, ModelError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Analysis not completed. Current status: {status}")]
    NotReady { job_id: String, status: JobStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    /// Rejected upload (bad extension, empty file).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output file missing: {0}")]
    OutputMissing(String),

    #[error("Executor is shutting down")]
    ShuttingDown,

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn not_found(job_id: impl ToString) -> Self {
        Self::NotFound(job_id.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Check if the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WorkerError::NotFound(_)
                | WorkerError::NotReady { .. }
                | WorkerError::Validation(_)
                | WorkerError::InvalidInput(_)
        )
    }
}

impl From<ModelError> for WorkerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Validation(msg) => WorkerError::Validation(msg),
            other => WorkerError::ProcessingFailed(other.to_string()),
        }
    }
}
