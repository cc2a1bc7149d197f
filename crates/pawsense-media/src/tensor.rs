//! Fixed-shape model input.

use ndarray::{ArrayD, IxDyn};

use crate::error::{MediaError, MediaResult};

/// Dense `f32` tensor fed to an inference adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: ArrayD<f32>,
}

impl FeatureTensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Build from a flat row-major buffer.
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>) -> MediaResult<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| MediaError::shape(format!("tensor shape {shape:?}: {e}")))?;
        Ok(Self { data })
    }

    /// All-zero tensor, used for warm-up runs.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Flat row-major copy of the values.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Fail with a model-input error unless the shape matches exactly.
    pub fn ensure_shape(&self, expected: &[usize]) -> MediaResult<()> {
        if self.shape() != expected {
            return Err(MediaError::ModelInput {
                expected: expected.to_vec(),
                actual: self.shape().to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_shape_vec() {
        let tensor = FeatureTensor::from_shape_vec(&[1, 2, 2, 1], vec![0.0, 0.25, 0.5, 1.0]).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 2, 1]);
        assert_eq!(tensor.to_vec(), vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_from_shape_vec_rejects_wrong_length() {
        let err = FeatureTensor::from_shape_vec(&[1, 3], vec![0.0; 2]).unwrap_err();
        assert!(matches!(err, MediaError::Shape(_)));
    }

    #[test]
    fn test_ensure_shape() {
        let tensor = FeatureTensor::zeros(&[1, 40]);
        assert!(tensor.ensure_shape(&[1, 40]).is_ok());
        assert!(matches!(
            tensor.ensure_shape(&[1, 39]),
            Err(MediaError::ModelInput { .. })
        ));
    }
}
