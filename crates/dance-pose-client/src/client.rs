//! Pose service HTTP client.

use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use dance_models::{ConfidenceParams, Pose};

use crate::config::PoseClientConfig;
use crate::error::{PoseClientError, PoseClientResult};
use crate::types::{
    CreateSessionRequest, CreateSessionResponse, DetectRequest, DetectResponse, HealthResponse,
};

/// Upper bound on a single backoff sleep.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Client for the external pose model service.
///
/// Each session on the service is one stateful tracker, so frames of a video
/// must go to the same session in order.
pub struct PoseServiceClient {
    http: Client,
    config: PoseClientConfig,
}

impl PoseServiceClient {
    /// Create a new pose service client.
    pub fn new(config: PoseClientConfig) -> PoseClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PoseClientError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> PoseClientResult<Self> {
        Self::new(PoseClientConfig::from_env())
    }

    pub fn config(&self) -> &PoseClientConfig {
        &self.config
    }

    /// Check if the pose service is healthy.
    pub async fn health_check(&self) -> PoseClientResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Pose service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Pose service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Open a tracker session with the given thresholds.
    pub async fn create_session(&self, params: &ConfidenceParams) -> PoseClientResult<String> {
        let url = format!("{}/sessions", self.config.base_url);
        let request = CreateSessionRequest {
            min_detection_confidence: params.min_detection_confidence,
            min_tracking_confidence: params.min_tracking_confidence,
            model_complexity: self.config.model_complexity,
        };

        let response = self
            .with_retry(|| async {
                let response = self.http.post(&url).json(&request).send().await?;
                check_status(response).await
            })
            .await?;

        let session: CreateSessionResponse = response.json().await?;
        debug!(session_id = %session.session_id, "Opened pose tracker session");
        Ok(session.session_id)
    }

    /// Run detection on one frame. Never retried: the tracker has already
    /// consumed the frame if the response was lost.
    pub async fn detect(&self, session_id: &str, frame: &RgbImage) -> PoseClientResult<Option<Pose>> {
        let url = format!("{}/sessions/{}/detect", self.config.base_url, session_id);
        let request = DetectRequest {
            width: frame.width(),
            height: frame.height(),
            image: encode_jpeg_base64(frame, self.config.jpeg_quality)?,
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let response = check_status(response).await?;
        let body: DetectResponse = response.json().await?;

        match body.landmarks {
            None => Ok(None),
            Some(keypoints) if keypoints.is_empty() => Ok(None),
            Some(keypoints) => Pose::new(keypoints)
                .map(Some)
                .map_err(|e| PoseClientError::InvalidResponse(e.to_string())),
        }
    }

    /// Release a tracker session. A session the service no longer knows is
    /// treated as released.
    pub async fn release_session(&self, session_id: &str) -> PoseClientResult<()> {
        let url = format!("{}/sessions/{}", self.config.base_url, session_id);

        self.with_retry(|| async {
            let response = self.http.delete(&url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            check_status(response).await.map(|_| ())
        })
        .await?;

        debug!(session_id, "Released pose tracker session");
        Ok(())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> PoseClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = PoseClientResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = retry_delay(self.config.retry_base_delay, attempt);
                    warn!(
                        "Pose service request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(PoseClientError::RequestFailed("Unknown error".to_string())))
    }
}

/// Exponential backoff for `attempt` (zero-based), capped at [`MAX_RETRY_DELAY`].
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// Map non-success statuses to errors; 5xx responses are retryable.
async fn check_status(response: Response) -> PoseClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("pose service returned {}: {}", status, body);
    if status.is_server_error() {
        Err(PoseClientError::ServiceUnavailable(message))
    } else {
        Err(PoseClientError::RequestFailed(message))
    }
}

fn encode_jpeg_base64(frame: &RgbImage, quality: u8) -> PoseClientResult<String> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
        .map_err(|e| PoseClientError::Encode(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 0), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 10), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, 40), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_jpeg_is_base64_encoded() {
        let frame = RgbImage::from_pixel(16, 8, Rgb([10, 200, 30]));
        let encoded = encode_jpeg_base64(&frame, 80).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
