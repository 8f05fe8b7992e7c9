//! Background removal of expired jobs and stray files.
//!
//! Finished jobs older than the retention window are deleted together with
//! their files. Files in the work directories that no longer belong to a known
//! job are removed once they are older than the same window.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::executor::JobExecutor;
use crate::metrics;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub jobs_removed: usize,
    pub files_removed: usize,
}

/// Retention sweeper service.
pub struct RetentionSweeper {
    executor: JobExecutor,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    /// Sweeper using the executor's configured retention and interval.
    pub fn new(executor: JobExecutor) -> Self {
        let retention = executor.config().retention;
        let interval = executor.config().sweep_interval;
        Self {
            executor,
            retention,
            interval,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run sweeps until `cancel` fires. Returns immediately when retention is zero.
    pub async fn run(self, cancel: CancellationToken) {
        if self.retention.is_zero() {
            info!("Job retention is disabled");
            return;
        }

        info!(
            retention_hours = self.retention.as_secs_f64() / 3600.0,
            "Starting retention sweeper (interval: {:?})", self.interval
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retention sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report != SweepReport::default() => info!(
                            jobs_removed = report.jobs_removed,
                            files_removed = report.files_removed,
                            "Retention sweep complete"
                        ),
                        Ok(_) => debug!("Retention sweep found nothing to remove"),
                        Err(e) => error!("Retention sweep error: {:#}", e),
                    }
                }
            }
        }
    }

    /// Run a single sweep.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();
        let max_age = chrono::Duration::from_std(self.retention)
            .context("retention window out of range")?;
        let now = Utc::now();

        for job in self.executor.list_jobs().await {
            let expired = job
                .completed_at()
                .map(|completed| job.is_terminal() && now - completed > max_age)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match self.executor.delete(&job.id).await {
                Ok(_) => report.jobs_removed += 1,
                // Deleted concurrently through the API.
                Err(WorkerError::NotFound(_)) => {}
                Err(e) => warn!(job_id = %job.id, "Failed to remove expired job: {}", e),
            }
        }

        let live: HashSet<String> = self
            .executor
            .list_jobs()
            .await
            .into_iter()
            .map(|job| job.id.to_string())
            .collect();
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for dir in self.executor.paths().dirs() {
            report.files_removed += remove_stray_files(dir, &live, cutoff)
                .await
                .with_context(|| format!("sweeping {}", dir.display()))?;
        }

        metrics::record_retention_removed("job", report.jobs_removed);
        metrics::record_retention_removed("file", report.files_removed);
        Ok(report)
    }
}

/// Job id a work file belongs to: the name up to the first underscore.
fn owner_of(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split_once('_').map(|(owner, _)| owner)
}

async fn remove_stray_files(
    dir: &Path,
    live: &HashSet<String>,
    cutoff: SystemTime,
) -> anyhow::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if owner_of(&path).is_some_and(|owner| live.contains(owner)) {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() || metadata.modified()? > cutoff {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stray file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Failed to remove stray file: {}", e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_of() {
        assert_eq!(owner_of(Path::new("/w/uploads/abc_input.mp4")), Some("abc"));
        assert_eq!(
            owner_of(Path::new("/w/outputs/abc_output_skeleton_only.mp4")),
            Some("abc")
        );
        assert_eq!(owner_of(Path::new("/w/uploads/loose.mp4")), None);
    }
}
