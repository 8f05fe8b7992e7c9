//! Job lifecycle metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "dance_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "dance_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "dance_jobs_failed_total";
    pub const JOBS_DELETED_TOTAL: &str = "dance_jobs_deleted_total";
    pub const JOB_DURATION_SECONDS: &str = "dance_job_duration_seconds";
    pub const RETENTION_REMOVED_TOTAL: &str = "dance_retention_removed_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record job completed with its processing time.
pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "completed").record(duration_secs);
}

/// Record job failed with its processing time.
pub fn record_job_failed(duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "failed").record(duration_secs);
}

pub fn record_job_deleted() {
    counter!(names::JOBS_DELETED_TOTAL).increment(1);
}

/// Record items removed by a retention sweep.
pub fn record_retention_removed(kind: &'static str, count: usize) {
    counter!(names::RETENTION_REMOVED_TOTAL, "kind" => kind).increment(count as u64);
}
