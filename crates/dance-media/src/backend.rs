//! Video decoding and encoding seams used by the pipeline.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;

use dance_models::{EncodingConfig, Resolution};

use crate::error::MediaResult;

/// Stream properties of an opened video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    /// Declared frame rate
    pub fps: f64,
    /// Declared frame count; informational only, the decoded count is authoritative
    pub frame_count: Option<u64>,
}

impl VideoSpec {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    /// Size in bytes of one packed RGB24 frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Sequential source of decoded frames.
#[async_trait]
pub trait FrameReader: Send {
    fn spec(&self) -> VideoSpec;

    /// Next frame in presentation order, `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;

    /// Release the decoder.
    async fn close(self: Box<Self>);
}

/// Sequential sink for encoded frames.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and finalize the output file.
    async fn finish(self: Box<Self>) -> MediaResult<()>;

    /// Stop encoding and delete the partial output.
    async fn abort(self: Box<Self>);
}

/// Opens readers and creates writers for video files.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Open `path` for decoding. Unreadable input is [`crate::MediaError::Input`].
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameReader>>;

    /// Create an encoder writing to `path` with the given geometry and rate.
    async fn create(
        &self,
        path: &Path,
        spec: &VideoSpec,
        encoding: &EncodingConfig,
    ) -> MediaResult<Box<dyn FrameWriter>>;
}
