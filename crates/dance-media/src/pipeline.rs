//! Frame-by-frame analysis of one video.
//!
//! The pipeline decodes the input, runs the pose detector on every frame in
//! order, renders both annotated streams and returns the summary together
//! with the keypoint export. Frames are processed strictly sequentially
//! because the detector tracks landmarks from one frame to the next.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dance_models::{
    AnalysisSummary, ConfidenceParams, EncodingConfig, FrameKeypoints, FrameResult, MovementStatistics,
};

use crate::annotate::FrameAnnotator;
use crate::backend::{FrameReader, FrameWriter, VideoBackend, VideoSpec};
use crate::detector::{PoseDetector, PoseDetectorFactory};
use crate::error::{MediaError, MediaResult};

/// Frames between progress reports.
pub const PROGRESS_INTERVAL: u64 = 30;

/// Called with `(frames_done, declared_total)` every [`PROGRESS_INTERVAL`] frames.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Inputs for one pipeline run.
#[derive(Clone)]
pub struct PipelineRequest {
    pub input_path: PathBuf,
    pub overlay_path: PathBuf,
    pub skeleton_path: PathBuf,
    pub params: ConfidenceParams,
    pub encoding: EncodingConfig,
    pub annotator: FrameAnnotator,
    pub progress: Option<ProgressCallback>,
}

impl PipelineRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        overlay_path: impl Into<PathBuf>,
        skeleton_path: impl Into<PathBuf>,
        params: ConfidenceParams,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            overlay_path: overlay_path.into(),
            skeleton_path: skeleton_path.into(),
            params,
            encoding: EncodingConfig::default(),
            annotator: FrameAnnotator::default(),
            progress: None,
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_annotator(mut self, annotator: FrameAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Result of a successful run. Both output videos exist on disk.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub summary: AnalysisSummary,
    /// One record per frame in which a pose was detected, in frame order.
    pub keypoints: Vec<FrameKeypoints>,
}

/// Running totals of the frame loop.
#[derive(Debug, Default)]
struct FrameTally {
    total: u64,
    detected: u64,
    visibility_sum: f64,
    keypoints: Vec<FrameKeypoints>,
}

impl FrameTally {
    fn record(&mut self, result: &FrameResult) {
        self.total += 1;
        if let Some(pose) = &result.pose {
            self.detected += 1;
            self.visibility_sum += pose.mean_visibility();
            self.keypoints.push(FrameKeypoints::from_pose(result.frame_index, pose));
        }
    }
}

/// Drives a [`VideoBackend`] and a [`PoseDetectorFactory`] over one video.
#[derive(Clone)]
pub struct VideoPipeline {
    backend: Arc<dyn VideoBackend>,
    detectors: Arc<dyn PoseDetectorFactory>,
}

impl VideoPipeline {
    pub fn new(backend: Arc<dyn VideoBackend>, detectors: Arc<dyn PoseDetectorFactory>) -> Self {
        Self { backend, detectors }
    }

    /// Analyze `request.input_path`, writing both annotated videos.
    ///
    /// On any error or cancellation both partial outputs are removed and the
    /// reader and detector are released before returning.
    pub async fn process(&self, request: &PipelineRequest, cancel: &CancellationToken) -> MediaResult<PipelineOutput> {
        let started = Instant::now();

        let mut reader = self.backend.open(&request.input_path).await?;
        let spec = reader.spec();
        info!(
            input = %request.input_path.display(),
            width = spec.width,
            height = spec.height,
            fps = spec.fps,
            declared_frames = ?spec.frame_count,
            "Processing video"
        );

        let mut detector = match self.detectors.create(&request.params).await {
            Ok(detector) => detector,
            Err(e) => {
                reader.close().await;
                return Err(e);
            }
        };

        let writers = match self.open_writers(request, &spec).await {
            Ok(writers) => writers,
            Err(e) => {
                detector.close().await;
                reader.close().await;
                return Err(e);
            }
        };
        let (mut overlay, mut skeleton) = writers;

        let outcome = run_frames(
            request,
            &spec,
            reader.as_mut(),
            detector.as_mut(),
            overlay.as_mut(),
            skeleton.as_mut(),
            cancel,
        )
        .await;

        reader.close().await;

        let tally = match outcome {
            Ok(tally) if tally.total > 0 => tally,
            Ok(_) => {
                overlay.abort().await;
                skeleton.abort().await;
                detector.close().await;
                return Err(MediaError::EmptyVideo);
            }
            Err(e) => {
                overlay.abort().await;
                skeleton.abort().await;
                detector.close().await;
                return Err(e);
            }
        };

        let finished = finish_both(overlay, skeleton).await;
        detector.close().await;
        if let Err(e) = finished {
            remove_outputs(&[request.overlay_path.as_path(), request.skeleton_path.as_path()]).await;
            return Err(e);
        }

        let statistics = MovementStatistics::from_visibility_sum(tally.detected, tally.visibility_sum);
        let summary = AnalysisSummary::new(tally.total, tally.detected, spec.fps, spec.resolution(), statistics)?;

        let elapsed = started.elapsed();
        metrics::histogram!("dance_pipeline_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            total_frames = summary.total_frames(),
            detected_frames = summary.detected_frames(),
            detection_rate = summary.detection_rate(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Processing complete"
        );

        Ok(PipelineOutput {
            summary,
            keypoints: tally.keypoints,
        })
    }

    async fn open_writers(
        &self,
        request: &PipelineRequest,
        spec: &VideoSpec,
    ) -> MediaResult<(Box<dyn FrameWriter>, Box<dyn FrameWriter>)> {
        let overlay = self
            .backend
            .create(&request.overlay_path, spec, &request.encoding)
            .await?;
        match self
            .backend
            .create(&request.skeleton_path, spec, &request.encoding)
            .await
        {
            Ok(skeleton) => Ok((overlay, skeleton)),
            Err(e) => {
                overlay.abort().await;
                Err(e)
            }
        }
    }
}

async fn run_frames(
    request: &PipelineRequest,
    spec: &VideoSpec,
    reader: &mut dyn FrameReader,
    detector: &mut dyn PoseDetector,
    overlay: &mut dyn FrameWriter,
    skeleton: &mut dyn FrameWriter,
    cancel: &CancellationToken,
) -> MediaResult<FrameTally> {
    let mut tally = FrameTally::default();

    loop {
        if cancel.is_cancelled() {
            info!(frames = tally.total, "Processing cancelled");
            return Err(MediaError::Cancelled);
        }

        let Some(frame) = reader.next_frame().await.map_err(into_processing)? else {
            break;
        };

        let result = FrameResult {
            frame_index: tally.total,
            pose: detector.detect(&frame).await?,
        };
        write_annotated(request, &frame, &result, overlay, skeleton).await?;
        tally.record(&result);
        metrics::counter!("dance_frames_processed_total").increment(1);

        if tally.total % PROGRESS_INTERVAL == 0 {
            match spec.frame_count {
                Some(declared) => info!("Processed {}/{} frames", tally.total, declared),
                None => info!("Processed {} frames", tally.total),
            }
            if let Some(progress) = &request.progress {
                progress(tally.total, spec.frame_count);
            }
        }
    }

    debug!(frames = tally.total, detected = tally.detected, "Reached end of stream");
    Ok(tally)
}

async fn write_annotated(
    request: &PipelineRequest,
    frame: &RgbImage,
    result: &FrameResult,
    overlay: &mut dyn FrameWriter,
    skeleton: &mut dyn FrameWriter,
) -> MediaResult<()> {
    let annotation = request.annotator.annotate(frame, result.pose.as_ref());
    overlay
        .write_frame(&annotation.overlay)
        .await
        .map_err(into_processing)?;
    skeleton
        .write_frame(&annotation.skeleton)
        .await
        .map_err(into_processing)
}

async fn finish_both(overlay: Box<dyn FrameWriter>, skeleton: Box<dyn FrameWriter>) -> MediaResult<()> {
    let overlay_result = overlay.finish().await;
    let skeleton_result = skeleton.finish().await;
    overlay_result.and(skeleton_result).map_err(into_processing)
}

async fn remove_outputs(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "Failed to remove output: {}", e);
            }
        }
    }
}

/// Mid-stream I/O failures are processing failures, not input errors.
fn into_processing(err: MediaError) -> MediaError {
    match err {
        MediaError::Io(e) => MediaError::processing(e.to_string()),
        MediaError::Input(msg) => MediaError::processing(msg),
        other => other,
    }
}
