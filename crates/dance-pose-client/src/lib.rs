//! Client for the external pose estimation model service.
//!
//! The service hosts the pretrained 33-landmark pose model. This crate
//! opens one stateful tracker session per video and adapts it to the
//! [`dance_media::PoseDetector`] contract used by the frame pipeline.

pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod types;

pub use client::PoseServiceClient;
pub use config::PoseClientConfig;
pub use detector::{RemotePoseDetector, RemotePoseDetectorFactory};
pub use error::{PoseClientError, PoseClientResult};
pub use types::{CreateSessionRequest, CreateSessionResponse, DetectRequest, DetectResponse, HealthResponse};
