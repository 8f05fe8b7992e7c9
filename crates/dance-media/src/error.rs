//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use dance_models::ModelError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during video analysis.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    /// The input cannot be opened or decoded at all.
    #[error("Could not open video: {0}")]
    Input(String),

    #[error("Video contains no decodable frames")]
    EmptyVideo,

    /// A failure part way through the frame loop (decode, encode or write).
    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pose detection failed: {0}")]
    Detection(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MediaError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the error was caused by the uploaded file rather than by the service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MediaError::Input(_) | MediaError::EmptyVideo | MediaError::FileNotFound(_)
        )
    }
}

impl From<ModelError> for MediaError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::EmptyVideo => MediaError::EmptyVideo,
            ModelError::Validation(msg) => MediaError::Validation(msg),
            other => MediaError::Processing(other.to_string()),
        }
    }
}
