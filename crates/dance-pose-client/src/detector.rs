//! [`PoseDetectorFactory`] backed by the remote pose service.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use tracing::warn;

use dance_media::{check_confidence, MediaResult, PoseDetector, PoseDetectorFactory};
use dance_models::{ConfidenceParams, Pose};

use crate::client::PoseServiceClient;

/// Opens one tracker session per video.
#[derive(Clone)]
pub struct RemotePoseDetectorFactory {
    client: Arc<PoseServiceClient>,
}

impl RemotePoseDetectorFactory {
    pub fn new(client: Arc<PoseServiceClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<PoseServiceClient> {
        &self.client
    }
}

#[async_trait]
impl PoseDetectorFactory for RemotePoseDetectorFactory {
    async fn create(&self, params: &ConfidenceParams) -> MediaResult<Box<dyn PoseDetector>> {
        check_confidence(params)?;
        let session_id = self.client.create_session(params).await?;
        Ok(Box::new(RemotePoseDetector {
            client: self.client.clone(),
            session_id,
        }))
    }
}

/// Detector bound to a single tracker session.
pub struct RemotePoseDetector {
    client: Arc<PoseServiceClient>,
    session_id: String,
}

impl RemotePoseDetector {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl PoseDetector for RemotePoseDetector {
    async fn detect(&mut self, frame: &RgbImage) -> MediaResult<Option<Pose>> {
        Ok(self.client.detect(&self.session_id, frame).await?)
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.client.release_session(&self.session_id).await {
            warn!(session_id = %self.session_id, "Failed to release pose tracker session: {}", e);
        }
    }
}
