//! Pose service client error types.

use thiserror::Error;

use dance_media::MediaError;

pub type PoseClientResult<T> = Result<T, PoseClientError>;

#[derive(Debug, Error)]
pub enum PoseClientError {
    #[error("Pose service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PoseClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PoseClientError::ServiceUnavailable(_) => true,
            PoseClientError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<PoseClientError> for MediaError {
    fn from(err: PoseClientError) -> Self {
        MediaError::detection(err.to_string())
    }
}
