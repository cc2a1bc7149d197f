//! Emotion analysis pipeline runner.
//!
//! This crate provides:
//! - Environment-driven pipeline configuration
//! - The audio and frame branches
//! - Job orchestration with fan-in, timeout and cancellation
//! - Session-level analyze/list/delete operations

pub mod branches;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod processor;

pub use branches::{BranchOutput, BranchProgress, FrameOutput};
pub use config::{validate_pipeline, PipelineConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, JobLogger};
pub use orchestrator::PipelineOrchestrator;
pub use processor::AnalysisProcessor;
