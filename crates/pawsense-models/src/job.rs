//! Analysis job definitions and the job state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::analysis::SessionId;
use crate::emotion::{EmotionScoreVector, Modality};

/// Default keyframe threshold on a 0-255 intensity scale.
pub const DEFAULT_KEYFRAME_THRESHOLD: f64 = 30.0;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

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

/// Independent unit of concurrent work inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Demux, preprocess and score the audio track
    Audio,
    /// Decode, select keyframes and score pose and micro-interactions
    Frames,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Audio => "audio",
            Branch::Frames => "frames",
        }
    }

    /// The branch that produces a modality's vector.
    pub fn for_modality(modality: Modality) -> Self {
        if modality.is_frame_derived() {
            Branch::Frames
        } else {
            Branch::Audio
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or corrupt media; not retryable without new input
    SourceUnreadable,
    /// Preprocessing could not produce a tensor
    ShapeError,
    /// Tensor does not match the model's declared input
    ModelInputError,
    /// Model raised at prediction time
    InferenceError,
    /// Malformed configuration or weights
    ConfigError,
    Timeout,
    Cancelled,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnreadable => "source_unreadable",
            ErrorKind::ShapeError => "shape_error",
            ErrorKind::ModelInputError => "model_input_error",
            ErrorKind::InferenceError => "inference_error",
            ErrorKind::ConfigError => "config_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The one structured error a failed job reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<Modality>,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            branch: None,
            modality: None,
            message: message.into(),
        }
    }

    pub fn in_branch(mut self, branch: Branch) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn with_modality(mut self, modality: Option<Modality>) -> Self {
        self.modality = modality;
        self
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(branch) = self.branch {
            write!(f, " in {branch} branch")?;
        }
        if let Some(modality) = self.modality {
            write!(f, " ({modality})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Fine-grained pipeline stage. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    #[default]
    Submitted,
    Extracting,
    Preprocessing,
    Inferring,
    Fusing,
    Succeeded,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Submitted => "submitted",
            JobStage::Extracting => "extracting",
            JobStage::Preprocessing => "preprocessing",
            JobStage::Inferring => "inferring",
            JobStage::Fusing => "fusing",
            JobStage::Succeeded => "succeeded",
            JobStage::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobStage::Submitted => 0,
            JobStage::Extracting => 1,
            JobStage::Preprocessing => 2,
            JobStage::Inferring => 3,
            JobStage::Fusing => 4,
            JobStage::Succeeded | JobStage::Failed => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Succeeded | JobStage::Failed)
    }

    /// Coarse status view of this stage.
    pub fn status(&self) -> JobStatus {
        match self {
            JobStage::Submitted => JobStatus::Pending,
            JobStage::Succeeded => JobStatus::Succeeded,
            JobStage::Failed => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One analysis of one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    /// Unique job ID
    pub id: JobId,

    /// Session the results are stored under
    pub session_id: SessionId,

    /// Input video
    pub video: PathBuf,

    /// Keyframe selection threshold
    pub threshold: f64,

    /// Current stage
    #[serde(default)]
    pub stage: JobStage,

    /// Per-modality vectors collected from finished branches
    #[serde(default)]
    pub results: BTreeMap<Modality, EmotionScoreVector>,

    /// Frame branch produced no keyframes and fell back to uniform vectors
    #[serde(default)]
    pub no_signal: bool,

    /// Keyframes analyzed by the frame branch
    #[serde(default)]
    pub keyframes: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineJob {
    pub fn new(video: impl Into<PathBuf>, threshold: f64) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            session_id: SessionId::new(),
            video: video.into(),
            threshold,
            stage: JobStage::Submitted,
            results: BTreeMap::new(),
            no_signal: false,
            keyframes: 0,
            failure: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.stage.status()
    }

    /// Move to a later stage. Returns false and leaves the job untouched when
    /// the target is not strictly after the current stage or the job is done.
    pub fn advance(&mut self, stage: JobStage) -> bool {
        if self.stage.is_terminal() || stage == JobStage::Failed {
            return false;
        }
        if stage.rank() <= self.stage.rank() {
            return false;
        }
        self.stage = stage;
        self.updated_at = Utc::now();
        if stage.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    /// Record a branch result. Ignored once the job is terminal.
    pub fn record_result(&mut self, modality: Modality, vector: EmotionScoreVector) {
        if self.stage.is_terminal() {
            return;
        }
        self.results.insert(modality, vector);
        self.updated_at = Utc::now();
    }

    /// Mark the job failed. The first failure wins.
    pub fn fail(&mut self, failure: JobFailure) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = JobStage::Failed;
        self.failure = Some(failure);
        self.updated_at = Utc::now();
        self.completed_at = Some(self.updated_at);
        true
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = PipelineJob::new("clip.mp4", DEFAULT_KEYFRAME_THRESHOLD);

        assert_eq!(job.stage, JobStage::Submitted);
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.threshold, 30.0);
        assert!(job.results.is_empty());
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_job_stage_transitions() {
        let mut job = PipelineJob::new("clip.mp4", 30.0);

        assert!(job.advance(JobStage::Extracting));
        assert_eq!(job.status(), JobStatus::Running);
        assert!(job.advance(JobStage::Inferring));
        assert!(!job.advance(JobStage::Preprocessing));
        assert_eq!(job.stage, JobStage::Inferring);

        assert!(job.advance(JobStage::Fusing));
        assert!(job.advance(JobStage::Succeeded));
        assert!(job.completed_at.is_some());
        assert!(!job.advance(JobStage::Fusing));
    }

    #[test]
    fn test_failed_is_terminal_and_first_failure_wins() {
        let mut job = PipelineJob::new("clip.mp4", 30.0);
        job.advance(JobStage::Extracting);

        let first = JobFailure::new(ErrorKind::InferenceError, "boom")
            .in_branch(Branch::Audio)
            .with_modality(Some(Modality::Audio));
        assert!(job.fail(first.clone()));
        assert!(!job.fail(JobFailure::new(ErrorKind::Cancelled, "late")));
        assert!(!job.advance(JobStage::Succeeded));

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure, Some(first));
    }

    #[test]
    fn test_advance_cannot_target_failed() {
        let mut job = PipelineJob::new("clip.mp4", 30.0);
        assert!(!job.advance(JobStage::Failed));
        assert_eq!(job.stage, JobStage::Submitted);
    }

    #[test]
    fn test_results_frozen_after_terminal() {
        let mut job = PipelineJob::new("clip.mp4", 30.0);
        job.fail(JobFailure::new(ErrorKind::Timeout, "deadline"));
        job.record_result(Modality::Pose, EmotionScoreVector::new());
        assert!(job.results.is_empty());
    }

    #[test]
    fn test_failure_display_and_serde() {
        let failure = JobFailure::new(ErrorKind::InferenceError, "session run failed")
            .in_branch(Branch::Audio)
            .with_modality(Some(Modality::Audio));
        assert_eq!(
            failure.to_string(),
            "inference_error in audio branch (audio): session run failed"
        );

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "inference_error");
        assert_eq!(json["branch"], "audio");
        assert_eq!(json["modality"], "audio");
    }

    #[test]
    fn test_branch_for_modality() {
        assert_eq!(Branch::for_modality(Modality::Audio), Branch::Audio);
        assert_eq!(Branch::for_modality(Modality::Pose), Branch::Frames);
        assert_eq!(Branch::for_modality(Modality::Micro), Branch::Frames);
    }
}
