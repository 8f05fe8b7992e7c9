//! Pose service client configuration.

use std::time::Duration;

/// Upper bound for `POSE_SERVICE_RETRIES`.
pub const MAX_RETRIES: u32 = 10;

/// Default pose service location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8001";

/// Configuration for the pose service client.
#[derive(Debug, Clone)]
pub struct PoseClientConfig {
    /// Base URL of the pose service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Max retries for session management calls
    pub max_retries: u32,
    /// First retry delay, doubled on each further attempt
    pub retry_base_delay: Duration,
    /// Model variant requested for new sessions (0-2)
    pub model_complexity: u8,
    /// JPEG quality used when uploading frames
    pub jpeg_quality: u8,
}

impl Default for PoseClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            model_complexity: 2,
            jpeg_quality: 90,
        }
    }
}

impl PoseClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("POSE_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("POSE_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("POSE_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .map(|r| r.min(MAX_RETRIES))
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
            model_complexity: std::env::var("POSE_MODEL_COMPLEXITY")
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .map(|c| c.min(2))
                .unwrap_or(defaults.model_complexity),
            jpeg_quality: std::env::var("POSE_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.jpeg_quality),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}
