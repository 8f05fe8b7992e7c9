//! Video analysis pipeline for dance pose estimation.
//!
//! This crate provides:
//! - The pose detector contract implemented by model adapters
//! - Skeleton rendering for overlay and skeleton-only frames
//! - The sequential frame pipeline with cancellation and cleanup
//! - FFmpeg CLI video I/O over raw RGB pipes

pub mod annotate;
pub mod backend;
pub mod command;
pub mod detector;
pub mod error;
pub mod ffmpeg;
pub mod pipeline;
pub mod probe;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use annotate::{Annotation, AnnotationStyle, FrameAnnotator, DEFAULT_VISIBILITY_THRESHOLD, POSE_CONNECTIONS};
pub use backend::{FrameReader, FrameWriter, VideoBackend, VideoSpec};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use detector::{check_confidence, PoseDetector, PoseDetectorFactory};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::FfmpegBackend;
pub use pipeline::{PipelineOutput, PipelineRequest, ProgressCallback, VideoPipeline, PROGRESS_INTERVAL};
pub use probe::{probe_video, VideoInfo};
