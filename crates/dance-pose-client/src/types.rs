//! Pose service request/response types.

use serde::{Deserialize, Serialize};

use dance_models::Keypoint;

/// Request to open a tracker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// 0 (lite) to 2 (most accurate)
    pub model_complexity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// One frame submitted to a tracker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub width: u32,
    pub height: u32,
    /// Base64 encoded JPEG
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Landmarks in model order, `null` when no person was found
    #[serde(default)]
    pub landmarks: Option<Vec<Keypoint>>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
}
