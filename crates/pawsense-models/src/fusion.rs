//! Weighted fusion of per-modality score vectors.
//!
//! The fused score of each label is a convex combination of the modality
//! scores: `Σ weights[m] * vectors[m][label]`, with absent labels counted as 0.
//! Weights are never renormalized when a modality did not produce a vector;
//! the configured weights are applied as-is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::emotion::{EmotionScoreVector, Modality};

/// Tolerance for the weights-sum-to-one invariant.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Errors raised by fusion. All of them are configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    #[error("No modality vectors to fuse")]
    NoModalities,

    #[error("Missing fusion weight for modality '{0}'")]
    MissingWeight(Modality),

    #[error("Fusion weight for '{modality}' out of range [0, 1]: {weight}")]
    WeightOutOfRange { modality: Modality, weight: f64 },

    #[error("Fusion weights must sum to 1, got {0}")]
    WeightSum(f64),
}

/// Per-modality fusion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FusionWeights(BTreeMap<Modality, f64>);

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new([
            (Modality::Audio, 0.2),
            (Modality::Pose, 0.4),
            (Modality::Micro, 0.4),
        ])
    }
}

impl FusionWeights {
    pub fn new(weights: impl IntoIterator<Item = (Modality, f64)>) -> Self {
        Self(weights.into_iter().collect())
    }

    pub fn get(&self, modality: Modality) -> Option<f64> {
        self.0.get(&modality).copied()
    }

    pub fn set(&mut self, modality: Modality, weight: f64) {
        self.0.insert(modality, weight);
    }

    pub fn covers(&self, modality: Modality) -> bool {
        self.0.contains_key(&modality)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Modality, f64)> + '_ {
        self.0.iter().map(|(m, w)| (*m, *w))
    }

    /// Check every weight is in [0, 1] and that they sum to 1.
    pub fn validate(&self) -> Result<(), FusionError> {
        for (modality, weight) in self.iter() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(FusionError::WeightOutOfRange { modality, weight });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(FusionError::WeightSum(sum));
        }
        Ok(())
    }
}

/// Fuse modality vectors into one vector keyed by the union of their labels.
pub fn fuse(
    vectors: &BTreeMap<Modality, EmotionScoreVector>,
    weights: &FusionWeights,
) -> Result<EmotionScoreVector, FusionError> {
    if vectors.is_empty() {
        return Err(FusionError::NoModalities);
    }
    for modality in vectors.keys() {
        if !weights.covers(*modality) {
            return Err(FusionError::MissingWeight(*modality));
        }
    }
    weights.validate()?;

    // union in first-seen order, walking modalities in canonical order
    let mut labels: Vec<&str> = Vec::new();
    for label in vectors.values().flat_map(|v| v.labels()) {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    let fused = labels
        .into_iter()
        .map(|label| {
            let score = vectors
                .iter()
                .map(|(modality, vector)| weights.get(*modality).unwrap_or(0.0) * vector.get(label))
                .sum::<f64>();
            (label.to_string(), score)
        })
        .collect();

    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(pairs: &[(&str, f64)]) -> EmotionScoreVector {
        pairs.iter().map(|(l, s)| (l.to_string(), *s)).collect()
    }

    #[test]
    fn test_single_modality_full_weight_is_identity() {
        let audio = vector(&[("Happy", 0.7), ("Sad", 0.1), ("Angry", 0.33)]);
        let vectors = BTreeMap::from([(Modality::Audio, audio.clone())]);
        let weights = FusionWeights::new([(Modality::Audio, 1.0)]);

        let fused = fuse(&vectors, &weights).unwrap();
        assert_eq!(fused, audio);
    }

    #[test]
    fn test_missing_labels_default_to_zero() {
        let vectors = BTreeMap::from([
            (Modality::Audio, vector(&[("Happy", 1.0), ("Bored", 0.5)])),
            (Modality::Micro, vector(&[("Happy", 0.5), ("Background", 1.0)])),
        ]);
        let weights = FusionWeights::new([(Modality::Audio, 0.5), (Modality::Micro, 0.5)]);

        let fused = fuse(&vectors, &weights).unwrap();
        assert_eq!(fused.len(), 3);
        assert!((fused.get("Happy") - 0.75).abs() < 1e-12);
        assert!((fused.get("Bored") - 0.25).abs() < 1e-12);
        assert!((fused.get("Background") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_fused_labels_follow_first_seen_order() {
        let vectors = BTreeMap::from([
            (Modality::Micro, vector(&[("Background", 0.2), ("Happy", 0.8)])),
            (Modality::Audio, vector(&[("Happy", 0.6), ("Bored", 0.4)])),
        ]);
        let weights = FusionWeights::new([(Modality::Audio, 0.5), (Modality::Micro, 0.5)]);

        let fused = fuse(&vectors, &weights).unwrap();
        assert_eq!(
            fused.labels().collect::<Vec<_>>(),
            vec!["Happy", "Bored", "Background"]
        );
    }

    #[test]
    fn test_fusion_is_bounded_by_inputs() {
        let a = vector(&[("Happy", 0.9), ("Sad", 0.2)]);
        let b = vector(&[("Happy", 0.3), ("Sad", 0.4)]);
        let c = vector(&[("Happy", 0.6), ("Sad", 0.8)]);
        let vectors = BTreeMap::from([
            (Modality::Audio, a.clone()),
            (Modality::Pose, b.clone()),
            (Modality::Micro, c.clone()),
        ]);

        let fused = fuse(&vectors, &FusionWeights::default()).unwrap();
        for label in ["Happy", "Sad"] {
            let inputs = [a.get(label), b.get(label), c.get(label)];
            let min = inputs.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = inputs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let value = fused.get(label);
            assert!(value >= min - 1e-12 && value <= max + 1e-12, "{label}: {value}");
        }
    }

    #[test]
    fn test_fusion_is_commutative_over_insertion_order() {
        let a = vector(&[("Happy", 0.9), ("Tired", 0.2)]);
        let b = vector(&[("Happy", 0.3), ("Relaxed", 0.4)]);
        let weights = FusionWeights::new([(Modality::Pose, 0.3), (Modality::Micro, 0.7)]);

        let mut forward = BTreeMap::new();
        forward.insert(Modality::Pose, a.clone());
        forward.insert(Modality::Micro, b.clone());
        let mut backward = BTreeMap::new();
        backward.insert(Modality::Micro, b);
        backward.insert(Modality::Pose, a);

        assert_eq!(fuse(&forward, &weights).unwrap(), fuse(&backward, &weights).unwrap());
    }

    #[test]
    fn test_absent_modality_weight_is_not_renormalized() {
        // Pose and micro weights stay at 0.4 even though audio produced nothing.
        let vectors = BTreeMap::from([
            (Modality::Pose, vector(&[("Happy", 1.0)])),
            (Modality::Micro, vector(&[("Happy", 1.0)])),
        ]);

        let fused = fuse(&vectors, &FusionWeights::default()).unwrap();
        assert!((fused.get("Happy") - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_missing_weight_is_rejected() {
        let vectors = BTreeMap::from([(Modality::Pose, vector(&[("Happy", 1.0)]))]);
        let weights = FusionWeights::new([(Modality::Audio, 1.0)]);

        assert_eq!(
            fuse(&vectors, &weights),
            Err(FusionError::MissingWeight(Modality::Pose))
        );
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let vectors = BTreeMap::from([(Modality::Audio, vector(&[("Happy", 1.0)]))]);
        let weights = FusionWeights::new([(Modality::Audio, 0.2), (Modality::Pose, 0.4)]);

        assert!(matches!(fuse(&vectors, &weights), Err(FusionError::WeightSum(_))));
    }

    #[test]
    fn test_weight_out_of_range_is_rejected() {
        let weights = FusionWeights::new([(Modality::Audio, 1.5), (Modality::Pose, -0.5)]);
        assert!(matches!(
            weights.validate(),
            Err(FusionError::WeightOutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let vectors = BTreeMap::new();
        assert_eq!(
            fuse(&vectors, &FusionWeights::default()),
            Err(FusionError::NoModalities)
        );
    }
}
