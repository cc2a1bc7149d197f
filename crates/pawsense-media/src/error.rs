//! Error types for media operations.

use pawsense_models::{ErrorKind, Modality};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while decoding, preprocessing or scoring media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Source unreadable: {message}")]
    SourceUnreadable {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Model input mismatch: expected {expected:?}, got {actual:?}")]
    ModelInput {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Inference failed for {modality}: {message}")]
    Inference { modality: Modality, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a source-unreadable error.
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            message: message.into(),
            path: None,
        }
    }

    /// Create a source-unreadable error for a specific file.
    pub fn unreadable_at(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a shape error.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    /// Create an inference error tagged with its modality.
    pub fn inference(modality: Modality, message: impl Into<String>) -> Self {
        Self::Inference {
            modality,
            message: message.into(),
        }
    }

    /// Create a model load error.
    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Taxonomy bucket reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::ModelNotFound(_)
            | MediaError::ModelLoad { .. } => ErrorKind::ConfigError,
            MediaError::SourceUnreadable { .. } | MediaError::Io(_) | MediaError::JsonParse(_) => {
                ErrorKind::SourceUnreadable
            }
            MediaError::Shape(_) => ErrorKind::ShapeError,
            MediaError::ModelInput { .. } => ErrorKind::ModelInputError,
            MediaError::Inference { .. } => ErrorKind::InferenceError,
            MediaError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Modality the error is attributed to, when known.
    pub fn modality(&self) -> Option<Modality> {
        match self {
            MediaError::Inference { modality, .. } => Some(*modality),
            _ => None,
        }
    }
}
