//! Structured job logging.
//!
//! Every lifecycle event of an analysis job is logged with the job ID and
//! operation attached, so a single job can be followed through the logs.

use std::time::Duration;

use tracing::{error, info, warn, Span};

use dance_models::{AnalysisSummary, Job, JobId};

/// Logger for one job's lifecycle events.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    /// Create a logger for `job_id` running `operation` (e.g. "pose_analysis").
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    /// The job left the queue and processing began.
    pub fn log_start(&self, job: &Job) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            input = %job.input_filename,
            min_detection_confidence = job.params.min_detection_confidence,
            min_tracking_confidence = job.params.min_tracking_confidence,
            "Job started"
        );
    }

    /// Frame progress, with the declared total when the container has one.
    pub fn log_progress(&self, frames_done: u64, declared_total: Option<u64>) {
        match declared_total {
            Some(total) => info!(
                job_id = %self.job_id,
                operation = self.operation,
                frames_done,
                total,
                "Job progress: {}/{} frames", frames_done, total
            ),
            None => info!(
                job_id = %self.job_id,
                operation = self.operation,
                frames_done,
                "Job progress: {} frames", frames_done
            ),
        }
    }

    pub fn log_completion(&self, summary: &AnalysisSummary, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            total_frames = summary.total_frames(),
            detected_frames = summary.detected_frames(),
            detection_rate = summary.detection_rate(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Job completed: {} of {} frames with a pose ({:.1}%)",
            summary.detected_frames(),
            summary.total_frames(),
            summary.detection_rate()
        );
    }

    /// The job failed; `reason` is the message stored on the job.
    pub fn log_failure(&self, reason: &str, elapsed: Duration) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            elapsed_secs = elapsed.as_secs_f64(),
            "Job failed: {}", reason
        );
    }

    /// The job was deleted while it ran; its outputs are thrown away.
    pub fn log_discarded(&self) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job deleted during processing, discarding outputs"
        );
    }

    /// Bookkeeping error that could not be recorded on the job itself.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span wrapping everything logged while the job runs.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "pose_analysis");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.operation(), "pose_analysis");
    }
}
