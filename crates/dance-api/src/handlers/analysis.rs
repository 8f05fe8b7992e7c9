//! Upload, status and result handlers.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, Response, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

use dance_models::{AnalysisSummary, ConfidenceParams, JobId, JobStatus, OutputVariant};
use dance_worker::{JobExecutor, StagedUpload};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Thresholds supplied as query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    pub min_detection_confidence: Option<f32>,
    pub min_tracking_confidence: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub result_url: String,
}

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub input_filename: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Analysis summary once completed
    pub results: Option<AnalysisSummary>,
    pub output_video_url: Option<String>,
    pub skeleton_video_url: Option<String>,
    pub keypoints_url: Option<String>,
    /// Error message if the job failed
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub variant: Option<String>,
}

/// Fields collected from the upload form.
#[derive(Default)]
struct UploadForm {
    video: Option<StagedUpload>,
    min_detection_confidence: Option<f32>,
    min_tracking_confidence: Option<f32>,
}

impl UploadForm {
    async fn discard(self) {
        if let Some(video) = self.video {
            video.discard().await;
        }
    }
}

/// POST /api/v1/analyze
///
/// Accepts a multipart form with a `video` file and optional confidence
/// thresholds, given either as form fields or query parameters. Form fields
/// win when both are present.
pub async fn analyze(
    State(state): State<AppState>,
    query: Result<Query<AnalyzeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut form = read_upload_form(&state.executor, multipart).await?;

    let upload = form
        .video
        .take()
        .ok_or_else(|| ApiError::bad_request("No video file provided"))?;

    let defaults = state.executor.config().default_params;
    let params = ConfidenceParams {
        min_detection_confidence: form
            .min_detection_confidence
            .or(query.min_detection_confidence)
            .unwrap_or(defaults.min_detection_confidence),
        min_tracking_confidence: form
            .min_tracking_confidence
            .or(query.min_tracking_confidence)
            .unwrap_or(defaults.min_tracking_confidence),
    };

    let size = upload.size();
    let job_id = state.executor.submit_staged(upload, params).await?;
    metrics::record_upload(size);
    info!(job_id = %job_id, size_bytes = size, "Video uploaded");

    Ok(Json(AnalyzeResponse {
        result_url: format!("/api/v1/status/{}", job_id),
        job_id: job_id.to_string(),
        status: JobStatus::Queued,
        message: "Video uploaded successfully. Analysis started.".to_string(),
    }))
}

/// Read the form, streaming the video to disk as it arrives.
///
/// Any staged file is removed again if the form turns out to be invalid.
async fn read_upload_form(executor: &JobExecutor, mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    match read_fields(executor, &mut multipart, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

async fn read_fields(executor: &JobExecutor, multipart: &mut Multipart, form: &mut UploadForm) -> ApiResult<()> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video" | "file" => {
                if let Some(previous) = form.video.take() {
                    previous.discard().await;
                }
                let filename = field.file_name().unwrap_or("").to_string();
                let upload = form.video.insert(executor.stage_upload(&filename).await?);
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    upload.write_chunk(&chunk).await?;
                }
            }
            "min_detection_confidence" => {
                let text = field.text().await.map_err(multipart_error)?;
                form.min_detection_confidence = Some(parse_threshold(&name, &text)?);
            }
            "min_tracking_confidence" => {
                let text = field.text().await.map_err(multipart_error)?;
                form.min_tracking_confidence = Some(parse_threshold(&name, &text)?);
            }
            _ => {}
        }
    }

    Ok(())
}

fn parse_threshold(name: &str, text: &str) -> ApiResult<f32> {
    text.trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("{} must be a number, got '{}'", name, text)))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Uploaded file is too large".to_string())
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// GET /api/v1/status/:job_id
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.executor.get_status(&JobId::from_string(job_id)).await?;
    let completed = job.status() == JobStatus::Completed;
    let id = job.id.to_string();

    Ok(Json(JobStatusResponse {
        status: job.status(),
        input_filename: job.input_filename.clone(),
        created_at: job.created_at,
        started_at: job.started_at(),
        completed_at: job.completed_at(),
        results: job.summary().cloned(),
        output_video_url: completed.then(|| format!("/api/v1/download/{}", id)),
        skeleton_video_url: completed.then(|| format!("/api/v1/download/{}?variant=skeleton", id)),
        keypoints_url: completed.then(|| format!("/api/v1/keypoints/{}", id)),
        error: job.error().map(str::to_string),
        job_id: id,
    }))
}

/// GET /api/v1/download/:job_id
pub async fn download_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> ApiResult<Response<Body>> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let variant = match query.variant {
        Some(variant) => variant
            .parse::<OutputVariant>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => OutputVariant::default(),
    };

    let job_id = JobId::from_string(job_id);
    let path = state.executor.get_output(&job_id, variant).await?;
    let filename = match variant {
        OutputVariant::Overlay => format!("analyzed_{}.mp4", job_id),
        OutputVariant::Skeleton => format!("skeleton_{}.mp4", job_id),
    };

    stream_file(&path, "video/mp4", Some(&filename)).await
}

/// GET /api/v1/results/:job_id
pub async fn get_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalysisSummary>> {
    let summary = state.executor.get_result(&JobId::from_string(job_id)).await?;
    Ok(Json(summary))
}

/// GET /api/v1/keypoints/:job_id
pub async fn get_keypoints(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response<Body>> {
    let path = state.executor.get_keypoints(&JobId::from_string(job_id)).await?;
    stream_file(&path, "application/json", None).await
}

/// Stream a file from disk, optionally as a named attachment.
async fn stream_file(
    path: &FsPath,
    content_type: &'static str,
    attachment: Option<&str>,
) -> ApiResult<Response<Body>> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Output file not found"))
        }
        Err(e) => return Err(ApiError::internal(e.to_string())),
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .len();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size.to_string());
    if let Some(filename) = attachment {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        );
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(e.to_string()))
}
