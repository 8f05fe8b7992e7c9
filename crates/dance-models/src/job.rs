//! Analysis job records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::AnalysisSummary;
use crate::error::{ModelError, ModelResult};
use crate::job_status::JobStatus;
use crate::params::ConfidenceParams;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which rendered video to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputVariant {
    /// Skeleton drawn over the original frames
    #[default]
    Overlay,
    /// Skeleton on a black background
    Skeleton,
}

impl OutputVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputVariant::Overlay => "overlay",
            OutputVariant::Skeleton => "skeleton",
        }
    }

    /// File name suffix used for this variant's output.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            OutputVariant::Overlay => "output.mp4",
            OutputVariant::Skeleton => "output_skeleton_only.mp4",
        }
    }
}

impl FromStr for OutputVariant {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overlay" | "annotated" => Ok(OutputVariant::Overlay),
            "skeleton" | "skeleton_only" => Ok(OutputVariant::Skeleton),
            other => Err(ModelError::validation(format!("unknown output variant: {}", other))),
        }
    }
}

/// Files produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutputs {
    pub overlay_path: PathBuf,
    pub skeleton_path: PathBuf,
    pub results_path: PathBuf,
    pub keypoints_path: PathBuf,
}

impl JobOutputs {
    pub fn video(&self, variant: OutputVariant) -> &PathBuf {
        match variant {
            OutputVariant::Overlay => &self.overlay_path,
            OutputVariant::Skeleton => &self.skeleton_path,
        }
    }

    pub fn paths(&self) -> [&PathBuf; 4] {
        [
            &self.overlay_path,
            &self.skeleton_path,
            &self.results_path,
            &self.keypoints_path,
        ]
    }
}

/// A unit of asynchronous video analysis.
///
/// Status changes go through [`Job::start_processing`], [`Job::complete`] and
/// [`Job::fail`], which reject any non-forward transition. Outputs and the
/// summary are only ever set together with `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    status: JobStatus,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    pub input_filename: String,
    pub input_path: PathBuf,
    pub params: ConfidenceParams,
    outputs: Option<JobOutputs>,
    summary: Option<AnalysisSummary>,
    error: Option<String>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(
        id: JobId,
        input_filename: impl Into<String>,
        input_path: impl Into<PathBuf>,
        params: ConfidenceParams,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            input_filename: input_filename.into(),
            input_path: input_path.into(),
            params,
            outputs: None,
            summary: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn outputs(&self) -> Option<&JobOutputs> {
        self.outputs.as_ref()
    }

    pub fn summary(&self) -> Option<&AnalysisSummary> {
        self.summary.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// `queued -> processing`.
    pub fn start_processing(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `processing -> completed`, attaching outputs and summary.
    pub fn complete(&mut self, outputs: JobOutputs, summary: AnalysisSummary) -> ModelResult<()> {
        self.transition(JobStatus::Completed)?;
        self.outputs = Some(outputs);
        self.summary = Some(summary);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `processing -> failed` with the error message.
    pub fn fail(&mut self, message: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MovementStatistics, Resolution};

    fn job() -> Job {
        Job::new(JobId::new(), "dance.mp4", "/tmp/x_input.mp4", ConfidenceParams::default())
    }

    fn outputs() -> JobOutputs {
        JobOutputs {
            overlay_path: "/o/a_output.mp4".into(),
            skeleton_path: "/o/a_output_skeleton_only.mp4".into(),
            results_path: "/r/a_results.json".into(),
            keypoints_path: "/r/a_keypoints.json".into(),
        }
    }

    fn summary() -> AnalysisSummary {
        AnalysisSummary::new(
            10,
            5,
            30.0,
            Resolution { width: 64, height: 48 },
            MovementStatistics::from_visibility_sum(5, 4.0),
        )
        .unwrap()
    }

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::new().as_str().len(), 36);
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.outputs().is_none());

        job.start_processing().unwrap();
        assert_eq!(job.status(), JobStatus::Processing);
        assert!(job.started_at().is_some());
        assert!(job.outputs().is_none());

        job.complete(outputs(), summary()).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.completed_at().is_some());
        assert_eq!(job.summary().unwrap().detection_rate(), 50.0);
    }

    #[test]
    fn test_failure_sets_completion_time() {
        let mut job = job();
        job.start_processing().unwrap();
        job.fail("decoder exploded").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("decoder exploded"));
        assert!(job.completed_at().is_some());
        assert!(job.outputs().is_none());
    }

    #[test]
    fn test_rejects_backward_transitions() {
        let mut job = job();
        assert!(matches!(
            job.complete(outputs(), summary()),
            Err(ModelError::InvalidTransition { .. })
        ));
        job.start_processing().unwrap();
        job.fail("x").unwrap();
        assert!(job.start_processing().is_err());
        assert!(job.fail("again").is_err());
        assert_eq!(job.error(), Some("x"));
    }

    #[test]
    fn test_output_variant_parsing() {
        assert_eq!("skeleton".parse::<OutputVariant>().unwrap(), OutputVariant::Skeleton);
        assert_eq!("OVERLAY".parse::<OutputVariant>().unwrap(), OutputVariant::Overlay);
        assert!("thumbnail".parse::<OutputVariant>().is_err());
        assert_eq!(outputs().video(OutputVariant::Skeleton).to_str(), Some("/o/a_output_skeleton_only.mp4"));
    }
}
