//! Emotion classifiers behind a common scoring capability.
//!
//! Every model is an [`InferenceAdapter`]: it declares its modality, its
//! ordered label set and its exact input shape, and maps a tensor of that
//! shape to an [`EmotionScoreVector`]. Adapters are loaded once and shared
//! read-only across jobs.

mod onnx;
mod registry;

use pawsense_models::{EmotionScoreVector, LabelSet, Modality};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MediaResult;
use crate::tensor::FeatureTensor;

pub use onnx::OnnxAdapter;
pub use registry::ModelRegistry;

/// Scoring capability of one loaded model.
pub trait InferenceAdapter: Send + Sync {
    fn modality(&self) -> Modality;

    /// Declared output ordering.
    fn labels(&self) -> &LabelSet;

    /// Exact tensor shape `score` accepts.
    fn input_shape(&self) -> &[usize];

    /// Score one tensor.
    ///
    /// Fails with a model-input error on a shape mismatch and with an
    /// inference error for any runtime failure.
    fn score(&self, tensor: &FeatureTensor) -> MediaResult<EmotionScoreVector>;
}

/// Declaration of one model to load at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub modality: Modality,
    pub path: PathBuf,
    pub input_shape: Vec<usize>,
    pub labels: LabelSet,
    /// Output tensor to read; the first output when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

impl ModelSpec {
    pub fn new(modality: Modality, path: impl Into<PathBuf>, input_shape: Vec<usize>) -> Self {
        Self {
            modality,
            path: path.into(),
            input_shape,
            labels: modality.default_labels(),
            output_name: None,
        }
    }

    /// Stock model layout for a modality.
    pub fn default_for(modality: Modality) -> Self {
        match modality {
            Modality::Audio => Self::new(modality, "models/audio_classifier.onnx", vec![1, 40]),
            Modality::Pose => {
                Self::new(modality, "models/pose_classifier.onnx", vec![1, 224, 224, 3])
            }
            Modality::Micro => {
                Self::new(modality, "models/micro_interaction.onnx", vec![1, 192, 192, 1])
            }
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}
