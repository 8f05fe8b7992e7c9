//! Test doubles: a synthetic video backend and scripted pose detectors.
//!
//! A synthetic "video" is a small JSON document describing the stream, so
//! tests can upload it through the real API and job flow without FFmpeg.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use dance_models::{ConfidenceParams, EncodingConfig, Keypoint, Pose, LANDMARK_COUNT};

use crate::backend::{FrameReader, FrameWriter, VideoBackend, VideoSpec};
use crate::detector::{check_confidence, PoseDetector, PoseDetectorFactory};
use crate::error::{MediaError, MediaResult};

/// Description of a generated video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    /// Decoding fails when this frame is reached.
    #[serde(default)]
    pub corrupt_at: Option<u64>,
    /// Artificial decode time per frame.
    #[serde(default)]
    pub frame_delay_ms: u64,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_count,
            corrupt_at: None,
            frame_delay_ms: 0,
        }
    }

    pub fn with_corrupt_frame(mut self, frame: u64) -> Self {
        self.corrupt_at = Some(frame);
        self
    }

    pub fn with_frame_delay(mut self, millis: u64) -> Self {
        self.frame_delay_ms = millis;
        self
    }

    /// Bytes to upload as the video file.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }
}

/// Contents of a finished synthetic output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticOutput {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames: u64,
}

#[derive(Debug, Default)]
struct BackendStats {
    readers_closed: AtomicUsize,
    finished: Mutex<HashMap<PathBuf, u64>>,
}

/// [`VideoBackend`] over [`SyntheticVideo`] descriptions.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    stats: Arc<BackendStats>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readers_closed(&self) -> usize {
        self.stats.readers_closed.load(Ordering::SeqCst)
    }

    /// Frame count of a successfully finished output.
    pub fn frames_written(&self, path: &Path) -> Option<u64> {
        self.stats.finished.lock().ok()?.get(path).copied()
    }
}

#[async_trait]
impl VideoBackend for SyntheticBackend {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameReader>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let video: SyntheticVideo = serde_json::from_slice(&bytes)
            .map_err(|e| MediaError::input(format!("cannot open {}: {}", path.display(), e)))?;
        if video.width == 0 || video.height == 0 {
            return Err(MediaError::input("video has no dimensions"));
        }

        Ok(Box::new(SyntheticReader {
            video,
            next: 0,
            stats: self.stats.clone(),
        }))
    }

    async fn create(
        &self,
        path: &Path,
        spec: &VideoSpec,
        _encoding: &EncodingConfig,
    ) -> MediaResult<Box<dyn FrameWriter>> {
        tokio::fs::write(path, b"").await?;
        Ok(Box::new(SyntheticWriter {
            path: path.to_path_buf(),
            spec: *spec,
            frames: 0,
            stats: self.stats.clone(),
        }))
    }
}

struct SyntheticReader {
    video: SyntheticVideo,
    next: u64,
    stats: Arc<BackendStats>,
}

#[async_trait]
impl FrameReader for SyntheticReader {
    fn spec(&self) -> VideoSpec {
        VideoSpec {
            width: self.video.width,
            height: self.video.height,
            fps: self.video.fps,
            frame_count: Some(self.video.frame_count),
        }
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.next >= self.video.frame_count {
            return Ok(None);
        }
        if self.video.corrupt_at == Some(self.next) {
            return Err(MediaError::processing(format!("corrupt frame {}", self.next)));
        }
        if self.video.frame_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.video.frame_delay_ms)).await;
        }

        let shade = (self.next % 256) as u8;
        self.next += 1;
        Ok(Some(RgbImage::from_pixel(
            self.video.width,
            self.video.height,
            Rgb([shade, shade, shade]),
        )))
    }

    async fn close(self: Box<Self>) {
        self.stats.readers_closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct SyntheticWriter {
    path: PathBuf,
    spec: VideoSpec,
    frames: u64,
    stats: Arc<BackendStats>,
}

#[async_trait]
impl FrameWriter for SyntheticWriter {
    async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.spec.width, self.spec.height) {
            return Err(MediaError::processing("frame size mismatch"));
        }
        self.frames += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> MediaResult<()> {
        let output = SyntheticOutput {
            width: self.spec.width,
            height: self.spec.height,
            fps: self.spec.fps,
            frames: self.frames,
        };
        tokio::fs::write(&self.path, serde_json::to_vec(&output)?).await?;
        if let Ok(mut finished) = self.stats.finished.lock() {
            finished.insert(self.path.clone(), self.frames);
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) {
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

/// A pose with every landmark visible, laid out on a grid inside the frame.
pub fn sample_pose(visibility: f32) -> Pose {
    let keypoints = (0..LANDMARK_COUNT)
        .map(|i| {
            let x = 0.2 + 0.6 * (i % 6) as f32 / 5.0;
            let y = 0.2 + 0.6 * (i / 6) as f32 / 5.0;
            Keypoint::new(x, y, -0.1, visibility)
        })
        .collect();
    Pose::new(keypoints).unwrap_or_else(|_| unreachable!("grid pose has {} keypoints", LANDMARK_COUNT))
}

type Script = Arc<dyn Fn(u64) -> Option<Pose> + Send + Sync>;

#[derive(Default)]
struct DetectorStats {
    created: AtomicUsize,
    closed: AtomicUsize,
    last_params: Mutex<Option<ConfidenceParams>>,
}

/// Factory for detectors whose answer depends only on the frame index.
#[derive(Clone)]
pub struct ScriptedPoseDetectorFactory {
    script: Script,
    fail_at: Option<u64>,
    stats: Arc<DetectorStats>,
}

impl ScriptedPoseDetectorFactory {
    pub fn from_fn(script: impl Fn(u64) -> Option<Pose> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            fail_at: None,
            stats: Arc::new(DetectorStats::default()),
        }
    }

    /// A pose in frames `0..n`, nothing afterwards.
    pub fn detect_first(n: u64) -> Self {
        Self::from_fn(move |frame| (frame < n).then(|| sample_pose(0.9)))
    }

    pub fn always() -> Self {
        Self::from_fn(|_| Some(sample_pose(0.9)))
    }

    pub fn never() -> Self {
        Self::from_fn(|_| None)
    }

    /// Detection returns an error at `frame`.
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn created(&self) -> usize {
        self.stats.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    /// Parameters passed to the most recent `create`.
    pub fn last_params(&self) -> Option<ConfidenceParams> {
        self.stats.last_params.lock().ok().and_then(|p| *p)
    }
}

#[async_trait]
impl PoseDetectorFactory for ScriptedPoseDetectorFactory {
    async fn create(&self, params: &ConfidenceParams) -> MediaResult<Box<dyn PoseDetector>> {
        check_confidence(params)?;
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.stats.last_params.lock() {
            *last = Some(*params);
        }
        Ok(Box::new(ScriptedPoseDetector {
            script: self.script.clone(),
            fail_at: self.fail_at,
            frame: 0,
            stats: self.stats.clone(),
        }))
    }
}

struct ScriptedPoseDetector {
    script: Script,
    fail_at: Option<u64>,
    frame: u64,
    stats: Arc<DetectorStats>,
}

#[async_trait]
impl PoseDetector for ScriptedPoseDetector {
    async fn detect(&mut self, _frame: &RgbImage) -> MediaResult<Option<Pose>> {
        let frame = self.frame;
        self.frame += 1;
        if self.fail_at == Some(frame) {
            return Err(MediaError::detection(format!("scripted failure at frame {}", frame)));
        }
        Ok((self.script)(frame))
    }

    async fn close(self: Box<Self>) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}
