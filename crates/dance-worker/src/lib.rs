//! Job store and background executor for dance video analysis.
//!
//! This crate provides:
//! - An in-memory job registry with forward-only status transitions
//! - Staged uploads streamed to disk before their job is created
//! - A bounded executor that runs each upload through the video pipeline
//! - Periodic retention of finished jobs and their files
//! - Structured job logging and lifecycle metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod retention;
pub mod store;
pub mod upload;

pub use config::{JobPaths, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::{allowed_extension, JobExecutor, ALLOWED_EXTENSIONS};
pub use logging::JobLogger;
pub use retention::{RetentionSweeper, SweepReport};
pub use store::JobStore;
pub use upload::StagedUpload;
