//! Pose detector contract.
//!
//! A detector wraps one stateful tracker of an external pose model. The
//! pipeline creates exactly one per video through a [`PoseDetectorFactory`],
//! feeds it every frame in order and closes it on every exit path.

use async_trait::async_trait;
use image::RgbImage;

use dance_models::{ConfidenceParams, Pose};

use crate::error::{MediaError, MediaResult};

/// Frame-by-frame pose detection for a single video.
#[async_trait]
pub trait PoseDetector: Send {
    /// Detect the pose in one RGB frame, `None` when no person is found.
    async fn detect(&mut self, frame: &RgbImage) -> MediaResult<Option<Pose>>;

    /// Release the underlying tracker.
    async fn close(self: Box<Self>);
}

/// Creates per-video detectors.
#[async_trait]
pub trait PoseDetectorFactory: Send + Sync {
    /// Create a fresh detector. Implementations call [`check_confidence`] first.
    async fn create(&self, params: &ConfidenceParams) -> MediaResult<Box<dyn PoseDetector>>;
}

/// Reject thresholds outside `[0, 1]` before any model resource is acquired.
pub fn check_confidence(params: &ConfidenceParams) -> MediaResult<()> {
    params.check().map_err(MediaError::from)
}
