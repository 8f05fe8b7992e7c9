//! Model validation errors.

use thiserror::Error;

use crate::job_status::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Video contains no decodable frames")]
    EmptyVideo,

    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
