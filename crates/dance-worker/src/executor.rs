//! Job executor.
//!
//! Owns the job store and runs each submitted job exactly once on a spawned
//! task, bounded by a semaphore. Results flow back only through the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use dance_media::{MediaError, PipelineOutput, PipelineRequest, VideoPipeline};
use dance_models::{
    AnalysisSummary, ConfidenceParams, Job, JobId, JobOutputs, JobStatus, OutputVariant,
};

use crate::config::{JobPaths, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::store::JobStore;
use crate::upload::StagedUpload;

/// Accepted upload extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".mp4", ".avi", ".mov"];

/// Contents of `{job_id}_results.json`.
#[derive(Debug, Serialize)]
struct ResultsDocument<'a> {
    job_id: &'a str,
    input_file: &'a str,
    output_file: &'a Path,
    skeleton_only_file: &'a Path,
    #[serde(flatten)]
    summary: &'a AnalysisSummary,
}

struct ExecutorInner {
    config: WorkerConfig,
    paths: JobPaths,
    store: JobStore,
    pipeline: VideoPipeline,
    job_semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    running: Mutex<HashMap<JobId, CancellationToken>>,
}

/// Job executor. Cloning yields another handle to the same executor.
#[derive(Clone)]
pub struct JobExecutor {
    inner: Arc<ExecutorInner>,
}

impl JobExecutor {
    /// Create a new job executor, creating the work directories.
    pub async fn new(config: WorkerConfig, pipeline: VideoPipeline) -> WorkerResult<Self> {
        config.validate()?;
        let paths = config.paths();
        paths.create_all().await?;

        info!(
            work_dir = %config.work_dir.display(),
            max_concurrent_jobs = config.max_concurrent_jobs,
            "Job executor ready"
        );

        Ok(Self {
            inner: Arc::new(ExecutorInner {
                job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
                paths,
                config,
                store: JobStore::new(),
                pipeline,
                shutdown: CancellationToken::new(),
                running: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn paths(&self) -> &JobPaths {
        &self.inner.paths
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Accept an in-memory upload and schedule it for analysis.
    ///
    /// Parameters, file type and content are validated before the job is
    /// created; a rejected upload leaves neither a job nor a file behind.
    pub async fn submit(
        &self,
        filename: &str,
        bytes: &[u8],
        params: ConfidenceParams,
    ) -> WorkerResult<JobId> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WorkerError::ShuttingDown);
        }
        params.check()?;

        let mut upload = self.stage_upload(filename).await?;
        if let Err(e) = upload.write_chunk(bytes).await {
            upload.discard().await;
            return Err(e);
        }
        self.submit_staged(upload, params).await
    }

    /// Start receiving an upload for `filename`.
    ///
    /// The file type is checked here, before any byte is written to disk.
    pub async fn stage_upload(&self, filename: &str) -> WorkerResult<StagedUpload> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WorkerError::ShuttingDown);
        }

        let extension = allowed_extension(filename).ok_or_else(|| {
            WorkerError::invalid_input(format!(
                "Invalid file type. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

        let job_id = JobId::new();
        let input_path = self.inner.paths.input(job_id.as_str(), &extension);
        StagedUpload::create(job_id, filename, input_path).await
    }

    /// Create the job for a fully received upload and schedule it.
    ///
    /// On rejection the staged file is removed.
    pub async fn submit_staged(
        &self,
        mut upload: StagedUpload,
        params: ConfidenceParams,
    ) -> WorkerResult<JobId> {
        if let Err(e) = self.accept_staged(&mut upload, &params).await {
            upload.discard().await;
            return Err(e);
        }

        let job_id = upload.job_id.clone();
        let size_bytes = upload.size();
        let job = Job::new(
            job_id.clone(),
            display_name(&upload.filename),
            upload.path.clone(),
            params,
        );
        let cancel = self.inner.shutdown.child_token();

        self.inner.running.lock().await.insert(job_id.clone(), cancel.clone());
        self.inner.store.insert(job).await;
        metrics::record_job_submitted();

        info!(
            job_id = %job_id,
            filename = %upload.filename,
            size_bytes,
            min_detection_confidence = params.min_detection_confidence,
            min_tracking_confidence = params.min_tracking_confidence,
            "Job queued"
        );

        tokio::spawn(self.clone().run_job(job_id.clone(), cancel));
        Ok(job_id)
    }

    async fn accept_staged(&self, upload: &mut StagedUpload, params: &ConfidenceParams) -> WorkerResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WorkerError::ShuttingDown);
        }
        params.check()?;
        if upload.size() == 0 {
            return Err(WorkerError::invalid_input("Uploaded file is empty"));
        }
        upload.finish().await
    }

    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<Job> {
        self.inner.store.get(job_id).await
    }

    /// Summary of a completed job.
    pub async fn get_result(&self, job_id: &JobId) -> WorkerResult<AnalysisSummary> {
        let job = self.completed_job(job_id).await?;
        job.summary()
            .cloned()
            .ok_or_else(|| WorkerError::OutputMissing(format!("summary of {}", job_id)))
    }

    /// Path of a completed job's rendered video.
    pub async fn get_output(&self, job_id: &JobId, variant: OutputVariant) -> WorkerResult<PathBuf> {
        let outputs = self.completed_outputs(job_id).await?;
        Ok(outputs.video(variant).clone())
    }

    /// Path of a completed job's per-frame keypoint export.
    pub async fn get_keypoints(&self, job_id: &JobId) -> WorkerResult<PathBuf> {
        Ok(self.completed_outputs(job_id).await?.keypoints_path)
    }

    /// All jobs, oldest first.
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.inner.store.list().await
    }

    /// Remove a job and its files, cancelling it if it is still running.
    pub async fn delete(&self, job_id: &JobId) -> WorkerResult<Job> {
        let job = self.inner.store.remove(job_id).await?;

        if let Some(cancel) = self.inner.running.lock().await.get(job_id) {
            debug!(job_id = %job_id, "Cancelling in-flight job");
            cancel.cancel();
        }

        let mut files = vec![job.input_path.clone()];
        files.extend(self.inner.paths.generated(job_id.as_str()));
        remove_files(&files).await;

        metrics::record_job_deleted();
        info!(job_id = %job_id, status = %job.status(), "Job deleted");
        Ok(job)
    }

    /// Number of jobs currently in `processing`.
    pub async fn active_jobs(&self) -> usize {
        self.inner.store.count_by_status(JobStatus::Processing).await
    }

    /// Stop accepting work, cancel everything in flight and wait for it to drain.
    pub async fn shutdown(&self) {
        info!("Shutdown signal received, stopping executor");
        self.inner.shutdown.cancel();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.inner.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs did not finish within {:?}",
                self.inner.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Wait until no job task is left, queued or running.
    pub async fn wait_for_jobs(&self) {
        loop {
            if self.inner.running.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn completed_job(&self, job_id: &JobId) -> WorkerResult<Job> {
        let job = self.inner.store.get(job_id).await?;
        if job.status() != JobStatus::Completed {
            return Err(WorkerError::NotReady {
                job_id: job_id.to_string(),
                status: job.status(),
            });
        }
        Ok(job)
    }

    async fn completed_outputs(&self, job_id: &JobId) -> WorkerResult<JobOutputs> {
        let job = self.completed_job(job_id).await?;
        job.outputs()
            .cloned()
            .ok_or_else(|| WorkerError::OutputMissing(format!("outputs of {}", job_id)))
    }

    async fn run_job(self, job_id: JobId, cancel: CancellationToken) {
        let permit = tokio::select! {
            permit = self.inner.job_semaphore.clone().acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        };

        match permit {
            Some(_permit) => {
                let logger = JobLogger::new(&job_id, "pose_analysis");
                let span = logger.create_span();
                self.execute(&job_id, &cancel, &logger).instrument(span).await;
            }
            None => debug!(job_id = %job_id, "Job cancelled before it started"),
        }

        self.inner.running.lock().await.remove(&job_id);
    }

    async fn execute(&self, job_id: &JobId, cancel: &CancellationToken, logger: &JobLogger) {
        let job = match self
            .inner
            .store
            .update(job_id, |job| {
                job.start_processing()?;
                Ok(job.clone())
            })
            .await
        {
            Ok(job) => job,
            Err(WorkerError::NotFound(_)) => return,
            Err(e) => {
                logger.log_error(&e.to_string());
                return;
            }
        };

        logger.log_start(&job);
        let started = Instant::now();

        let result = match self.inner.pipeline.process(&self.request_for(&job, logger), cancel).await {
            Ok(output) => self.persist(&job, output).await,
            Err(e) => Err(WorkerError::from(e)),
        };
        let elapsed = started.elapsed();

        match result {
            Ok((outputs, summary)) => {
                let logged = summary.clone();
                let files = outputs.clone();
                let completed = self
                    .inner
                    .store
                    .update(job_id, |job| Ok(job.complete(outputs, summary)?))
                    .await;

                match completed {
                    Ok(()) => {
                        metrics::record_job_completed(elapsed.as_secs_f64());
                        logger.log_completion(&logged, elapsed);
                    }
                    Err(WorkerError::NotFound(_)) => {
                        logger.log_discarded();
                        let paths: Vec<PathBuf> = files.paths().into_iter().cloned().collect();
                        remove_files(&paths).await;
                    }
                    Err(e) => logger.log_error(&e.to_string()),
                }
            }
            Err(e) => {
                let message = failure_message(&e);
                match self.inner.store.update(job_id, |job| Ok(job.fail(message.clone())?)).await {
                    Ok(()) => {
                        metrics::record_job_failed(elapsed.as_secs_f64());
                        logger.log_failure(&message, elapsed);
                    }
                    Err(WorkerError::NotFound(_)) => {
                        debug!(job_id = %job_id, "Job deleted during processing");
                    }
                    Err(e) => logger.log_error(&e.to_string()),
                }
            }
        }
    }

    fn request_for(&self, job: &Job, logger: &JobLogger) -> PipelineRequest {
        let id = job.id.as_str();
        let progress_logger = logger.clone();

        PipelineRequest::new(
            &job.input_path,
            self.inner.paths.overlay(id),
            self.inner.paths.skeleton(id),
            job.params,
        )
        .with_encoding(self.inner.config.encoding.clone())
        .with_annotator(self.inner.config.annotator())
        .with_progress(Arc::new(move |done, total| {
            progress_logger.log_progress(done, total)
        }))
    }

    /// Write the results and keypoint documents next to the rendered videos.
    async fn persist(
        &self,
        job: &Job,
        output: PipelineOutput,
    ) -> WorkerResult<(JobOutputs, AnalysisSummary)> {
        let id = job.id.as_str();
        let outputs = JobOutputs {
            overlay_path: self.inner.paths.overlay(id),
            skeleton_path: self.inner.paths.skeleton(id),
            results_path: self.inner.paths.results(id),
            keypoints_path: self.inner.paths.keypoints(id),
        };

        let document = ResultsDocument {
            job_id: id,
            input_file: &job.input_filename,
            output_file: &outputs.overlay_path,
            skeleton_only_file: &outputs.skeleton_path,
            summary: &output.summary,
        };

        let written = async {
            tokio::fs::write(&outputs.results_path, serde_json::to_vec_pretty(&document)?).await?;
            tokio::fs::write(&outputs.keypoints_path, serde_json::to_vec(&output.keypoints)?).await?;
            WorkerResult::Ok(())
        }
        .await;

        if let Err(e) = written {
            let paths: Vec<PathBuf> = outputs.paths().into_iter().cloned().collect();
            remove_files(&paths).await;
            return Err(e);
        }

        Ok((outputs, output.summary))
    }
}

/// Lowercased extension of `filename` if it is an accepted video type.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let extension = Path::new(filename).extension()?.to_str()?;
    let extension = format!(".{}", extension.to_ascii_lowercase());
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Some(extension)
    } else {
        None
    }
}

/// Client-supplied name without any directory components.
fn display_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename)
        .to_string()
}

fn failure_message(err: &WorkerError) -> String {
    match err {
        WorkerError::Media(MediaError::Cancelled) => "Processing cancelled".to_string(),
        WorkerError::Media(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

/// Remove files, ignoring ones that are already gone.
pub(crate) async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Failed to remove file: {}", e),
        }
    }
}
