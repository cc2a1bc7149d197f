//! Worker error types.

use std::time::Duration;

use pawsense_media::MediaError;
use pawsense_models::{Branch, ErrorKind, FusionError, JobFailure, Modality};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{branch} branch failed: {source}")]
    BranchFailed {
        branch: Branch,
        modality: Option<Modality>,
        #[source]
        source: MediaError,
    },

    #[error("{branch} branch panicked: {message}")]
    BranchPanicked { branch: Branch, message: String },

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Fusion error: {0}")]
    Fusion(#[from] FusionError),

    #[error("Storage error: {0}")]
    Storage(#[from] pawsense_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Branch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Attribute a media error to the branch (and modality) it came from.
    pub fn branch_failed(branch: Branch, modality: Option<Modality>, source: MediaError) -> Self {
        let modality = modality.or_else(|| source.modality());
        Self::BranchFailed {
            branch,
            modality,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::ConfigError(_) | WorkerError::Fusion(_) => ErrorKind::ConfigError,
            WorkerError::BranchFailed { source, .. } => source.kind(),
            WorkerError::Media(e) => e.kind(),
            WorkerError::Timeout(_) => ErrorKind::Timeout,
            WorkerError::Cancelled => ErrorKind::Cancelled,
            WorkerError::Storage(_) => ErrorKind::Storage,
            WorkerError::BranchPanicked { .. } | WorkerError::Join(_) | WorkerError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn branch(&self) -> Option<Branch> {
        match self {
            WorkerError::BranchFailed { branch, .. } | WorkerError::BranchPanicked { branch, .. } => {
                Some(*branch)
            }
            _ => None,
        }
    }

    pub fn modality(&self) -> Option<Modality> {
        match self {
            WorkerError::BranchFailed { modality, .. } => *modality,
            WorkerError::Media(e) => e.modality(),
            _ => None,
        }
    }

    /// Structured record stored on the failed job.
    pub fn to_failure(&self) -> JobFailure {
        let message = match self {
            WorkerError::BranchFailed { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        let failure = JobFailure::new(self.kind(), message).with_modality(self.modality());
        match self.branch() {
            Some(branch) => failure.in_branch(branch),
            None => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_failure_record() {
        let err = WorkerError::branch_failed(
            Branch::Audio,
            None,
            MediaError::inference(Modality::Audio, "bad graph"),
        );
        assert_eq!(err.kind(), ErrorKind::InferenceError);

        let failure = err.to_failure();
        assert_eq!(failure.branch, Some(Branch::Audio));
        assert_eq!(failure.modality, Some(Modality::Audio));
        assert!(failure.message.contains("bad graph"));
    }

    #[test]
    fn test_explicit_modality_wins() {
        let err = WorkerError::branch_failed(
            Branch::Frames,
            Some(Modality::Micro),
            MediaError::shape("zero-area image"),
        );
        assert_eq!(err.kind(), ErrorKind::ShapeError);
        assert_eq!(err.modality(), Some(Modality::Micro));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(WorkerError::config_error("x").kind(), ErrorKind::ConfigError);
        assert_eq!(WorkerError::from(FusionError::NoModalities).kind(), ErrorKind::ConfigError);
        assert_eq!(WorkerError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Timeout);
        assert_eq!(WorkerError::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(WorkerError::Cancelled.to_failure().branch.is_none());

        let panicked = WorkerError::BranchPanicked {
            branch: Branch::Frames,
            message: "boom".into(),
        };
        assert_eq!(panicked.kind(), ErrorKind::Internal);
        assert_eq!(panicked.to_failure().branch, Some(Branch::Frames));
    }
}
