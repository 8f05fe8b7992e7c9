//! Job listing and deletion handlers.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use dance_models::{JobId, JobStatus};

use crate::error::ApiResult;
use crate::state::AppState;

/// One row of the job list.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub input_filename: String,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub total_jobs: usize,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let jobs: Vec<JobSummary> = state
        .executor
        .list_jobs()
        .await
        .into_iter()
        .map(|job| JobSummary {
            status: job.status(),
            job_id: job.id.to_string(),
            created_at: job.created_at,
            input_filename: job.input_filename,
        })
        .collect();

    Json(JobListResponse {
        total_jobs: jobs.len(),
        jobs,
    })
}

/// DELETE /api/v1/jobs/:job_id
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let job_id = JobId::from_string(job_id);
    state.executor.delete(&job_id).await?;

    Ok(Json(MessageResponse {
        message: format!("Job {} deleted successfully", job_id),
    }))
}
