//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use dance_media::{FrameAnnotator, DEFAULT_VISIBILITY_THRESHOLD};
use dance_models::{
    ConfidenceParams, EncodingConfig, DEFAULT_MIN_DETECTION_CONFIDENCE,
    DEFAULT_MIN_TRACKING_CONFIDENCE,
};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of the uploads/outputs/results directories
    pub work_dir: PathBuf,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Age after which finished jobs and stray files are removed (zero disables)
    pub retention: Duration,
    /// How often the retention sweeper runs
    pub sweep_interval: Duration,
    /// Thresholds used when a request does not supply its own
    pub default_params: ConfidenceParams,
    /// Minimum landmark visibility for drawing
    pub visibility_threshold: f32,
    /// Output video encoding
    pub encoding: EncodingConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/dance-analysis"),
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(60),
            retention: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(3600),
            default_params: ConfidenceParams::default(),
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            encoding: EncodingConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut encoding = EncodingConfig::default();
        if let Ok(codec) = std::env::var("VIDEO_CODEC") {
            encoding = encoding.with_codec(codec);
        }
        if let Ok(preset) = std::env::var("VIDEO_PRESET") {
            encoding = encoding.with_preset(preset);
        }
        if let Some(crf) = parse_env::<u8>("VIDEO_CRF") {
            encoding = encoding.with_crf(crf);
        }

        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_concurrent_jobs: parse_env::<usize>("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            shutdown_timeout: Duration::from_secs(
                parse_env("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(60),
            ),
            retention: Duration::from_secs(
                parse_env::<u64>("JOB_RETENTION_HOURS").unwrap_or(24) * 3600,
            ),
            sweep_interval: Duration::from_secs(
                parse_env::<u64>("RETENTION_SWEEP_INTERVAL_SECS")
                    .filter(|s| *s > 0)
                    .unwrap_or(3600),
            ),
            default_params: ConfidenceParams {
                min_detection_confidence: parse_env("DEFAULT_MIN_DETECTION_CONFIDENCE")
                    .unwrap_or(DEFAULT_MIN_DETECTION_CONFIDENCE),
                min_tracking_confidence: parse_env("DEFAULT_MIN_TRACKING_CONFIDENCE")
                    .unwrap_or(DEFAULT_MIN_TRACKING_CONFIDENCE),
            },
            visibility_threshold: parse_env("ANNOTATION_VISIBILITY_THRESHOLD")
                .unwrap_or(defaults.visibility_threshold),
            encoding,
        }
    }

    /// Config rooted at `work_dir`, everything else default.
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    /// Reject settings that would make every job fail.
    pub fn validate(&self) -> WorkerResult<()> {
        self.default_params.check().map_err(|e| {
            WorkerError::validation(format!("invalid default confidence thresholds: {}", e))
        })?;
        if !(0.0..=1.0).contains(&self.visibility_threshold) {
            return Err(WorkerError::validation(format!(
                "annotation visibility threshold must be between 0 and 1, got {}",
                self.visibility_threshold
            )));
        }
        Ok(())
    }

    pub fn annotator(&self) -> FrameAnnotator {
        FrameAnnotator::with_visibility_threshold(self.visibility_threshold)
    }

    pub fn paths(&self) -> JobPaths {
        JobPaths::new(&self.work_dir)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// On-disk layout of job files.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub uploads: PathBuf,
    pub outputs: PathBuf,
    pub results: PathBuf,
}

impl JobPaths {
    pub fn new(work_dir: &std::path::Path) -> Self {
        Self {
            uploads: work_dir.join("uploads"),
            outputs: work_dir.join("outputs"),
            results: work_dir.join("results"),
        }
    }

    pub fn input(&self, job_id: &str, extension: &str) -> PathBuf {
        self.uploads.join(format!("{}_input{}", job_id, extension))
    }

    pub fn overlay(&self, job_id: &str) -> PathBuf {
        self.outputs.join(format!("{}_output.mp4", job_id))
    }

    pub fn skeleton(&self, job_id: &str) -> PathBuf {
        self.outputs.join(format!("{}_output_skeleton_only.mp4", job_id))
    }

    pub fn results(&self, job_id: &str) -> PathBuf {
        self.results.join(format!("{}_results.json", job_id))
    }

    pub fn keypoints(&self, job_id: &str) -> PathBuf {
        self.results.join(format!("{}_keypoints.json", job_id))
    }

    /// Every file a job may own besides its input.
    pub fn generated(&self, job_id: &str) -> [PathBuf; 4] {
        [
            self.overlay(job_id),
            self.skeleton(job_id),
            self.results(job_id),
            self.keypoints(job_id),
        ]
    }

    pub fn dirs(&self) -> [&PathBuf; 3] {
        [&self.uploads, &self.outputs, &self.results]
    }

    /// Create all directories.
    pub async fn create_all(&self) -> std::io::Result<()> {
        for dir in self.dirs() {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
