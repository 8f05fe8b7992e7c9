use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use dance_media::testing::{ScriptedPoseDetectorFactory, SyntheticBackend, SyntheticVideo};
use dance_media::VideoPipeline;
use dance_models::{ConfidenceParams, Job, JobId, JobStatus, OutputVariant};
use dance_worker::{JobExecutor, RetentionSweeper, WorkerConfig, WorkerError};

struct Harness {
    _dir: TempDir,
    executor: JobExecutor,
    backend: SyntheticBackend,
    detectors: ScriptedPoseDetectorFactory,
}

async fn harness(detectors: ScriptedPoseDetectorFactory) -> Harness {
    harness_with(detectors, |_| {}).await
}

async fn harness_with(
    detectors: ScriptedPoseDetectorFactory,
    configure: impl FnOnce(&mut WorkerConfig),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let backend = SyntheticBackend::new();
    let pipeline = VideoPipeline::new(Arc::new(backend.clone()), Arc::new(detectors.clone()));
    let mut config = WorkerConfig::with_work_dir(dir.path());
    config.shutdown_timeout = Duration::from_secs(5);
    configure(&mut config);

    let executor = JobExecutor::new(config, pipeline).await.unwrap();
    Harness {
        _dir: dir,
        executor,
        backend,
        detectors,
    }
}

async fn wait_for(executor: &JobExecutor, id: &JobId, done: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..1000 {
        let job = executor.get_status(id).await.unwrap();
        if done(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached the expected state", id);
}

async fn wait_terminal(executor: &JobExecutor, id: &JobId) -> Job {
    wait_for(executor, id, Job::is_terminal).await
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

fn rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Queued => 0,
        JobStatus::Processing => 1,
        JobStatus::Completed | JobStatus::Failed => 2,
    }
}

#[tokio::test]
async fn ten_frames_with_five_poses_completes_at_fifty_percent() {
    let h = harness(ScriptedPoseDetectorFactory::detect_first(5)).await;
    let video = SyntheticVideo::new(64, 48, 30.0, 10);

    let id = h
        .executor
        .submit("dance.mp4", &video.to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();
    let job = wait_terminal(&h.executor, &id).await;

    assert_eq!(job.status(), JobStatus::Completed, "error: {:?}", job.error());
    assert!(job.completed_at().is_some());
    assert_eq!(job.input_filename, "dance.mp4");

    let summary = h.executor.get_result(&id).await.unwrap();
    assert_eq!(summary.total_frames(), 10);
    assert_eq!(summary.detected_frames(), 5);
    assert!((summary.detection_rate() - 50.0).abs() < 1e-9);

    let overlay = h.executor.get_output(&id, OutputVariant::Overlay).await.unwrap();
    let skeleton = h.executor.get_output(&id, OutputVariant::Skeleton).await.unwrap();
    assert_eq!(h.backend.frames_written(&overlay), Some(10));
    assert_eq!(h.backend.frames_written(&skeleton), Some(10));

    let results: Value =
        serde_json::from_slice(&std::fs::read(&job.outputs().unwrap().results_path).unwrap()).unwrap();
    assert_eq!(results["job_id"], id.as_str());
    assert_eq!(results["input_file"], "dance.mp4");
    assert_eq!(results["total_frames"], 10);
    assert_eq!(results["detection_rate"], 50.0);

    let keypoints_path = h.executor.get_keypoints(&id).await.unwrap();
    let keypoints: Value = serde_json::from_slice(&std::fs::read(keypoints_path).unwrap()).unwrap();
    assert_eq!(keypoints.as_array().unwrap().len(), 5);
    assert_eq!(h.detectors.closed(), 1);
}

#[tokio::test]
async fn repeated_reads_of_a_completed_job_are_identical() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let id = h
        .executor
        .submit("a.mov", &SyntheticVideo::new(32, 32, 24.0, 4).to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();
    wait_terminal(&h.executor, &id).await;

    assert_eq!(
        h.executor.get_status(&id).await.unwrap(),
        h.executor.get_status(&id).await.unwrap()
    );
    assert_eq!(
        h.executor.get_result(&id).await.unwrap(),
        h.executor.get_result(&id).await.unwrap()
    );
}

#[tokio::test]
async fn status_only_moves_forward_and_outputs_wait_for_completion() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let video = SyntheticVideo::new(32, 32, 30.0, 20).with_frame_delay(10);
    let id = h
        .executor
        .submit("slow.mp4", &video.to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();

    let mut seen = Vec::new();
    let mut checked_not_ready = false;
    loop {
        let job = h.executor.get_status(&id).await.unwrap();
        seen.push(job.status());
        if job.status() == JobStatus::Processing && !checked_not_ready {
            let err = h.executor.get_output(&id, OutputVariant::Overlay).await.unwrap_err();
            assert!(matches!(err, WorkerError::NotReady { .. }));
            assert!(matches!(h.executor.get_result(&id).await, Err(WorkerError::NotReady { .. })));
            checked_not_ready = true;
        }
        if job.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(checked_not_ready);
    assert!(seen.windows(2).all(|w| rank(w[0]) <= rank(w[1])));
    assert_eq!(seen.last(), Some(&JobStatus::Completed));
}

#[tokio::test]
async fn rejected_uploads_create_no_job() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let video = SyntheticVideo::new(32, 32, 30.0, 3).to_bytes();

    let empty = h.executor.submit("empty.mp4", &[], ConfidenceParams::default()).await;
    assert!(matches!(empty, Err(WorkerError::InvalidInput(_))));

    let wrong_type = h.executor.submit("notes.txt", &video, ConfidenceParams::default()).await;
    assert!(matches!(wrong_type, Err(WorkerError::InvalidInput(_))));

    let params = ConfidenceParams {
        min_detection_confidence: 1.5,
        min_tracking_confidence: 0.5,
    };
    let bad_params = h.executor.submit("dance.mp4", &video, params).await;
    assert!(matches!(bad_params, Err(WorkerError::Validation(_))));

    assert!(h.executor.list_jobs().await.is_empty());
    assert_eq!(count_files(&h.executor.paths().uploads), 0);
    assert_eq!(h.detectors.created(), 0);
}

#[tokio::test]
async fn staged_upload_written_in_chunks_is_analyzed() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let bytes = SyntheticVideo::new(32, 24, 30.0, 4).to_bytes();

    let mut upload = h.executor.stage_upload("clips/Dance.MOV").await.unwrap();
    for chunk in bytes.chunks(7) {
        upload.write_chunk(chunk).await.unwrap();
    }
    assert_eq!(upload.size(), bytes.len() as u64);
    assert!(upload.path().to_string_lossy().ends_with("_input.mov"));

    let id = h
        .executor
        .submit_staged(upload, ConfidenceParams::default())
        .await
        .unwrap();
    let job = wait_terminal(&h.executor, &id).await;
    assert_eq!(job.status(), JobStatus::Completed, "error: {:?}", job.error());
    assert_eq!(job.input_filename, "Dance.MOV");
    assert_eq!(std::fs::read(&job.input_path).unwrap(), bytes);
}

#[tokio::test]
async fn rejected_staged_uploads_leave_no_files() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let bytes = SyntheticVideo::new(32, 24, 30.0, 4).to_bytes();

    let wrong_type = h.executor.stage_upload("notes.txt").await;
    assert!(matches!(wrong_type, Err(WorkerError::InvalidInput(_))));

    let empty = h.executor.stage_upload("empty.mp4").await.unwrap();
    let result = h.executor.submit_staged(empty, ConfidenceParams::default()).await;
    assert!(matches!(result, Err(WorkerError::InvalidInput(_))));

    let mut bad_params = h.executor.stage_upload("dance.mp4").await.unwrap();
    bad_params.write_chunk(&bytes).await.unwrap();
    let params = ConfidenceParams {
        min_detection_confidence: 0.5,
        min_tracking_confidence: -1.0,
    };
    let result = h.executor.submit_staged(bad_params, params).await;
    assert!(matches!(result, Err(WorkerError::Validation(_))));

    let mut abandoned = h.executor.stage_upload("dance.mp4").await.unwrap();
    abandoned.write_chunk(&bytes[..10]).await.unwrap();
    abandoned.discard().await;

    assert!(h.executor.list_jobs().await.is_empty());
    assert_eq!(count_files(&h.executor.paths().uploads), 0);
    assert_eq!(h.detectors.created(), 0);
}

#[tokio::test]
async fn out_of_range_default_thresholds_fail_at_startup() {
    let dir = TempDir::new().unwrap();
    let pipeline = VideoPipeline::new(
        Arc::new(SyntheticBackend::new()),
        Arc::new(ScriptedPoseDetectorFactory::always()),
    );
    let mut config = WorkerConfig::with_work_dir(dir.path().join("work"));
    config.default_params.min_tracking_confidence = 7.0;

    let result = JobExecutor::new(config, pipeline).await;
    assert!(matches!(result, Err(WorkerError::Validation(_))));
    assert!(!dir.path().join("work").exists());
}

#[tokio::test]
async fn undecodable_upload_ends_failed() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let id = h
        .executor
        .submit("broken.MP4", b"definitely not a video", ConfidenceParams::default())
        .await
        .unwrap();

    let job = wait_terminal(&h.executor, &id).await;
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error().unwrap().contains("Could not open video"));
    assert!(job.completed_at().is_some());
    assert!(job.outputs().is_none());
    assert!(matches!(h.executor.get_result(&id).await, Err(WorkerError::NotReady { .. })));
}

#[tokio::test]
async fn mid_stream_failure_leaves_no_outputs() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let video = SyntheticVideo::new(32, 32, 30.0, 12).with_corrupt_frame(6);
    let id = h
        .executor
        .submit("corrupt.avi", &video.to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();

    let job = wait_terminal(&h.executor, &id).await;
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error().unwrap().contains("corrupt frame 6"));
    assert_eq!(count_files(&h.executor.paths().outputs), 0);
    assert_eq!(count_files(&h.executor.paths().results), 0);
    assert_eq!(h.detectors.closed(), 1);
}

#[tokio::test]
async fn delete_removes_job_and_files() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let id = h
        .executor
        .submit("a.mp4", &SyntheticVideo::new(32, 32, 30.0, 3).to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();
    wait_terminal(&h.executor, &id).await;
    assert_eq!(count_files(&h.executor.paths().outputs), 2);

    h.executor.delete(&id).await.unwrap();

    assert!(h.executor.list_jobs().await.is_empty());
    assert!(matches!(h.executor.get_status(&id).await, Err(WorkerError::NotFound(_))));
    assert!(matches!(h.executor.delete(&id).await, Err(WorkerError::NotFound(_))));
    for dir in h.executor.paths().dirs() {
        assert_eq!(count_files(dir), 0, "{} not empty", dir.display());
    }
}

#[tokio::test]
async fn deleting_an_in_flight_job_cancels_it() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let video = SyntheticVideo::new(32, 32, 30.0, 500).with_frame_delay(10);
    let id = h
        .executor
        .submit("long.mp4", &video.to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();
    wait_for(&h.executor, &id, |job| job.status() == JobStatus::Processing).await;

    h.executor.delete(&id).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), h.executor.wait_for_jobs())
        .await
        .unwrap();

    assert!(matches!(h.executor.get_status(&id).await, Err(WorkerError::NotFound(_))));
    for dir in h.executor.paths().dirs() {
        assert_eq!(count_files(dir), 0, "{} not empty", dir.display());
    }
    assert_eq!(h.detectors.closed(), 1);
    assert_eq!(h.backend.readers_closed(), 1);
}

#[tokio::test]
async fn jobs_beyond_the_limit_wait_for_a_slot() {
    let h = harness_with(ScriptedPoseDetectorFactory::always(), |config| {
        config.max_concurrent_jobs = 1;
    })
    .await;
    let video = SyntheticVideo::new(32, 32, 30.0, 10).with_frame_delay(5).to_bytes();

    let first = h.executor.submit("1.mp4", &video, ConfidenceParams::default()).await.unwrap();
    let second = h.executor.submit("2.mp4", &video, ConfidenceParams::default()).await.unwrap();

    let first = wait_terminal(&h.executor, &first).await;
    let second = wait_terminal(&h.executor, &second).await;
    assert_eq!(first.status(), JobStatus::Completed);
    assert_eq!(second.status(), JobStatus::Completed);
    assert!(second.started_at().unwrap() >= first.completed_at().unwrap());
}

#[tokio::test]
async fn list_is_ordered_by_creation() {
    let h = harness(ScriptedPoseDetectorFactory::never()).await;
    let video = SyntheticVideo::new(16, 16, 30.0, 2).to_bytes();

    let mut ids = Vec::new();
    for name in ["1.mp4", "2.avi", "3.mov"] {
        ids.push(h.executor.submit(name, &video, ConfidenceParams::default()).await.unwrap());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed: Vec<JobId> = h.executor.list_jobs().await.into_iter().map(|job| job.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn shutdown_cancels_work_and_refuses_new_jobs() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let video = SyntheticVideo::new(32, 32, 30.0, 500).with_frame_delay(10);
    let id = h
        .executor
        .submit("long.mp4", &video.to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();
    wait_for(&h.executor, &id, |job| job.status() == JobStatus::Processing).await;

    h.executor.shutdown().await;

    let job = h.executor.get_status(&id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error(), Some("Processing cancelled"));

    let late = h
        .executor
        .submit("late.mp4", &video.to_bytes(), ConfidenceParams::default())
        .await;
    assert!(matches!(late, Err(WorkerError::ShuttingDown)));
}

#[tokio::test]
async fn retention_removes_expired_jobs_and_stray_files() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let id = h
        .executor
        .submit("old.mp4", &SyntheticVideo::new(16, 16, 30.0, 2).to_bytes(), ConfidenceParams::default())
        .await
        .unwrap();
    wait_terminal(&h.executor, &id).await;
    std::fs::write(h.executor.paths().uploads.join("orphan.mp4"), b"left over").unwrap();

    let keep = RetentionSweeper::new(h.executor.clone());
    assert_eq!(keep.sweep_once().await.unwrap().jobs_removed, 0);
    assert!(h.executor.get_status(&id).await.is_ok());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let sweeper = RetentionSweeper::new(h.executor.clone()).with_retention(Duration::from_millis(10));
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.jobs_removed, 1);
    assert_eq!(report.files_removed, 1);
    assert!(matches!(h.executor.get_status(&id).await, Err(WorkerError::NotFound(_))));
    for dir in h.executor.paths().dirs() {
        assert_eq!(count_files(dir), 0, "{} not empty", dir.display());
    }
}

#[tokio::test]
async fn retention_loop_stops_on_cancel_and_can_be_disabled() {
    let h = harness(ScriptedPoseDetectorFactory::always()).await;
    let cancel = tokio_util::sync::CancellationToken::new();

    let disabled = RetentionSweeper::new(h.executor.clone()).with_retention(Duration::ZERO);
    tokio::time::timeout(Duration::from_secs(1), disabled.run(cancel.clone()))
        .await
        .unwrap();

    let sweeper = RetentionSweeper::new(h.executor.clone()).with_interval(Duration::from_millis(10));
    let handle = tokio::spawn(sweeper.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
