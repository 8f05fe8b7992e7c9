//! Shared data models for the dance analysis service.
//!
//! This crate provides Serde-serializable types for:
//! - Poses, keypoints and the 33-landmark body topology
//! - Analysis summaries and keypoint exports
//! - Jobs, their status machine and confidence parameters
//! - Output encoding configuration

pub mod analysis;
pub mod encoding;
pub mod error;
pub mod job;
pub mod job_status;
pub mod params;
pub mod pose;

// Re-export common types
pub use analysis::{AnalysisSummary, MovementStatistics, Resolution};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobOutputs, OutputVariant};
pub use job_status::JobStatus;
pub use params::{ConfidenceParams, DEFAULT_MIN_DETECTION_CONFIDENCE, DEFAULT_MIN_TRACKING_CONFIDENCE};
pub use pose::{BodySide, FrameKeypoints, FrameResult, Keypoint, LandmarkRecord, Pose, PoseLandmark, LANDMARK_COUNT};
