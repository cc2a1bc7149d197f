//! Shared data models for the PawSense pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Emotion labels, modalities and score vectors
//! - Weighted fusion of per-modality vectors
//! - Analysis jobs, stages and the error taxonomy
//! - Persisted analysis reports

pub mod analysis;
pub mod emotion;
pub mod fusion;
pub mod job;

// Re-export common types
pub use analysis::{AnalysisReport, KeyframeScores, SessionId};
pub use emotion::{
    EmotionScoreVector, LabelSet, Modality, ScoreAccumulator, EMOTIONS, MICRO_EMOTIONS,
};
pub use fusion::{fuse, FusionError, FusionWeights};
pub use job::{
    Branch, ErrorKind, JobFailure, JobId, JobStage, JobStatus, PipelineJob,
    DEFAULT_KEYFRAME_THRESHOLD,
};
