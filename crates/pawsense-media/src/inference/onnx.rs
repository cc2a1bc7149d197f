//! ONNX Runtime adapter.

use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use pawsense_models::{EmotionScoreVector, LabelSet, Modality};
use tracing::{debug, info};

use super::{InferenceAdapter, ModelSpec};
use crate::error::{MediaError, MediaResult};
use crate::tensor::FeatureTensor;

/// Classifier backed by an ONNX Runtime session.
///
/// The session is not shared between threads concurrently; calls are
/// serialized through the mutex.
pub struct OnnxAdapter {
    spec: ModelSpec,
    session: Mutex<Session>,
}

impl OnnxAdapter {
    /// Load the model file declared by `spec`.
    pub fn load(spec: ModelSpec) -> MediaResult<Self> {
        if spec.input_shape.is_empty() || spec.input_shape.contains(&0) {
            return Err(MediaError::model_load(
                &spec.path,
                format!("invalid input shape {:?}", spec.input_shape),
            ));
        }
        if spec.labels.is_empty() {
            return Err(MediaError::model_load(&spec.path, "empty label set"));
        }
        if !spec.path.exists() {
            return Err(MediaError::ModelNotFound(spec.path.clone()));
        }

        let session = Mutex::new(create_session(&spec.path)?);
        info!(
            modality = %spec.modality,
            model_path = %spec.path.display(),
            input_shape = ?spec.input_shape,
            labels = spec.labels.len(),
            "Model loaded"
        );

        Ok(Self { spec, session })
    }

    /// Run a zero tensor through the model and return its output width.
    pub fn warm_up(&self) -> MediaResult<usize> {
        let zeros = FeatureTensor::zeros(&self.spec.input_shape);
        let width = self.run(&zeros)?.len();
        debug!(modality = %self.spec.modality, width, "Warm-up inference complete");
        Ok(width)
    }

    fn run(&self, tensor: &FeatureTensor) -> MediaResult<Vec<f32>> {
        let modality = self.spec.modality;
        let shape = tensor.shape().to_vec();
        let input: Value = Tensor::from_array((shape, tensor.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::inference(modality, format!("Failed to create tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::inference(modality, "Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::inference(modality, format!("ONNX inference failed: {e}")))?;

        let values = match self.spec.output_name.as_deref() {
            Some(name) => {
                let output = outputs
                    .get(name)
                    .ok_or_else(|| MediaError::inference(modality, format!("Missing {name} tensor")))?;
                let tensor = output
                    .try_extract_tensor::<f32>()
                    .map_err(|e| MediaError::inference(modality, format!("Failed to extract tensor: {e}")))?;
                tensor.1.to_vec()
            }
            None => {
                let (_, output) = outputs
                    .iter()
                    .next()
                    .ok_or_else(|| MediaError::inference(modality, "Model produced no output"))?;
                let tensor = output
                    .try_extract_tensor::<f32>()
                    .map_err(|e| MediaError::inference(modality, format!("Failed to extract tensor: {e}")))?;
                tensor.1.to_vec()
            }
        };

        Ok(values)
    }
}

impl InferenceAdapter for OnnxAdapter {
    fn modality(&self) -> Modality {
        self.spec.modality
    }

    fn labels(&self) -> &LabelSet {
        &self.spec.labels
    }

    fn input_shape(&self) -> &[usize] {
        &self.spec.input_shape
    }

    fn score(&self, tensor: &FeatureTensor) -> MediaResult<EmotionScoreVector> {
        tensor.ensure_shape(&self.spec.input_shape)?;
        let raw = self.run(tensor)?;
        Ok(EmotionScoreVector::from_scores(&self.spec.labels, &raw))
    }
}

/// Create an ONNX Runtime session on the CPU execution provider.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::model_load(model_path, format!("Failed to read model file: {e}")))?;

    Session::builder()
        .map_err(|e| MediaError::model_load(model_path, format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::model_load(model_path, format!("Failed to set optimization level: {e}")))?
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::model_load(model_path, format!("Failed to load ONNX model: {e}")))
}
