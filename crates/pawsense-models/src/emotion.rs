//! Emotion labels, modalities and score vectors.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The 11-label emotion set shared by the audio and pose classifiers.
pub const EMOTIONS: &[&str] = &[
    "Surprised", "Excited", "Happy", "Content", "Relaxed", "Tired", "Bored", "Sad", "Neutral",
    "Scared", "Angry",
];

/// The 5-class output of the micro-interaction classifier.
pub const MICRO_EMOTIONS: &[&str] = &["Angry", "Happy", "Relaxed", "Sad", "Background"];

/// One independent analysis channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Vocalisations from the audio track
    Audio,
    /// Whole-body posture from keyframes
    Pose,
    /// Close-up micro-interactions from keyframes
    Micro,
}

impl Modality {
    /// All modalities in canonical order.
    pub const ALL: [Modality; 3] = [Modality::Audio, Modality::Pose, Modality::Micro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "audio",
            Modality::Pose => "pose",
            Modality::Micro => "micro",
        }
    }

    /// Whether this modality is derived from sampled video frames.
    pub fn is_frame_derived(&self) -> bool {
        matches!(self, Modality::Pose | Modality::Micro)
    }

    /// Default label ordering for models of this modality.
    pub fn default_labels(&self) -> LabelSet {
        match self {
            Modality::Audio | Modality::Pose => LabelSet::from_static(EMOTIONS),
            Modality::Micro => LabelSet::from_static(MICRO_EMOTIONS),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(Modality::Audio),
            "pose" => Ok(Modality::Pose),
            "micro" | "micro_interaction" => Ok(Modality::Micro),
            other => Err(format!("unknown modality: {other}")),
        }
    }
}

/// Ordered label set declared by a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    pub fn from_static(labels: &[&str]) -> Self {
        Self::new(labels.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Mapping from emotion label to a probability-like score.
///
/// Scores are not required to sum to 1. Lookups of absent labels yield 0.
/// Labels keep the order they were first inserted in, which for model output
/// is the declared label order; serialized JSON follows the same order.
#[derive(Debug, Clone, Default)]
pub struct EmotionScoreVector(Vec<(String, f64)>);

impl EmotionScoreVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip raw model outputs against a declared label ordering.
    ///
    /// When the model emits fewer scores than labels, only the first N labels
    /// receive a score; the rest stay absent.
    pub fn from_scores(labels: &LabelSet, scores: &[f32]) -> Self {
        labels
            .iter()
            .zip(scores.iter())
            .map(|(label, score)| (label.to_string(), f64::from(*score)))
            .collect()
    }

    /// Neutral fallback: uniform 1/N over the declared labels.
    pub fn uniform(labels: &LabelSet) -> Self {
        if labels.is_empty() {
            return Self::default();
        }
        let value = 1.0 / labels.len() as f64;
        labels.iter().map(|l| (l.to_string(), value)).collect()
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.0.iter().position(|(l, _)| l == label)
    }

    /// Set a score. An existing label keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, score: f64) {
        let label = label.into();
        match self.position(&label) {
            Some(i) => self.0[i].1 = score,
            None => self.0.push((label, score)),
        }
    }

    /// Score for a label, 0 when absent.
    pub fn get(&self, label: &str) -> f64 {
        self.position(label).map_or(0.0, |i| self.0[i].1)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Label with the highest score, if any. Ties go to the earlier label.
    pub fn dominant(&self) -> Option<(&str, f64)> {
        self.iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
    }
}

/// Equal when both carry the same labels with the same scores, in any order.
impl PartialEq for EmotionScoreVector {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(label, score)| other.position(label).map(|i| other.0[i].1) == Some(score))
    }
}

impl FromIterator<(String, f64)> for EmotionScoreVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        let mut vector = Self::new();
        for (label, score) in iter {
            vector.insert(label, score);
        }
        vector
    }
}

impl Serialize for EmotionScoreVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(label, score)| (label, score)))
    }
}

impl<'de> Deserialize<'de> for EmotionScoreVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = EmotionScoreVector;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of emotion label to score")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut vector = EmotionScoreVector::new();
                while let Some((label, score)) = map.next_entry::<String, f64>()? {
                    vector.insert(label, score);
                }
                Ok(vector)
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

/// Running per-label mean over a sequence of score vectors.
///
/// Each label is averaged over the vectors that carry it. Labels come out in
/// the order they were first seen.
#[derive(Debug, Clone, Default)]
pub struct ScoreAccumulator {
    sums: Vec<(String, f64, u32)>,
    samples: u32,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, vector: &EmotionScoreVector) {
        for (label, score) in vector.iter() {
            match self.sums.iter_mut().find(|(l, _, _)| l == label) {
                Some(entry) => {
                    entry.1 += score;
                    entry.2 += 1;
                }
                None => self.sums.push((label.to_string(), score, 1)),
            }
        }
        self.samples += 1;
    }

    /// Number of vectors added.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn mean(&self) -> EmotionScoreVector {
        self.sums
            .iter()
            .map(|(label, sum, count)| (label.clone(), sum / f64::from((*count).max(1))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scores_truncates_to_shorter_output() {
        let labels = LabelSet::from_static(MICRO_EMOTIONS);
        let vector = EmotionScoreVector::from_scores(&labels, &[0.1, 0.7, 0.2]);

        assert_eq!(vector.len(), 3);
        assert!((vector.get("Happy") - 0.7).abs() < 1e-6);
        assert!(!vector.contains("Sad"));
        assert!(!vector.contains("Background"));
        assert_eq!(vector.get("Sad"), 0.0);
    }

    #[test]
    fn test_uniform_fallback_over_eleven_labels() {
        let vector = EmotionScoreVector::uniform(&Modality::Audio.default_labels());

        assert_eq!(vector.len(), 11);
        for (_, score) in vector.iter() {
            assert!((score - 1.0 / 11.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_accumulator_mean_per_label() {
        let mut acc = ScoreAccumulator::new();
        let a: EmotionScoreVector = [("Happy".to_string(), 0.2), ("Sad".to_string(), 0.6)]
            .into_iter()
            .collect();
        let b: EmotionScoreVector = [("Happy".to_string(), 0.4)].into_iter().collect();
        acc.add(&a);
        acc.add(&b);

        let mean = acc.mean();
        assert_eq!(acc.samples(), 2);
        assert!((mean.get("Happy") - 0.3).abs() < 1e-12);
        assert!((mean.get("Sad") - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_dominant_label() {
        let labels = LabelSet::from_static(MICRO_EMOTIONS);
        let vector = EmotionScoreVector::from_scores(&labels, &[0.1, 0.05, 0.8, 0.05, 0.0]);
        assert_eq!(vector.dominant().map(|(l, _)| l), Some("Relaxed"));
    }

    #[test]
    fn test_modality_serde_and_parse() {
        assert_eq!(serde_json::to_string(&Modality::Micro).unwrap(), "\"micro\"");
        assert_eq!("Pose".parse::<Modality>().unwrap(), Modality::Pose);
        assert!("smell".parse::<Modality>().is_err());
        assert!(Modality::Micro.is_frame_derived());
        assert!(!Modality::Audio.is_frame_derived());
    }

    #[test]
    fn test_vector_serializes_as_flat_object() {
        let mut vector = EmotionScoreVector::new();
        vector.insert("Happy", 0.5);
        let json = serde_json::to_value(&vector).unwrap();
        assert_eq!(json, serde_json::json!({ "Happy": 0.5 }));
    }

    #[test]
    fn test_vector_keeps_declared_label_order() {
        let labels = Modality::Audio.default_labels();
        let vector = EmotionScoreVector::from_scores(&labels, &[0.3, 0.1, 0.6]);

        let json = serde_json::to_string(&vector).unwrap();
        assert!(json.starts_with(r#"{"Surprised":"#));
        assert!(json.find("Excited").unwrap() < json.find("Happy").unwrap());

        let back: EmotionScoreVector = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.labels().collect::<Vec<_>>(),
            vec!["Surprised", "Excited", "Happy"]
        );
    }

    #[test]
    fn test_equality_ignores_label_order() {
        let a: EmotionScoreVector = [("Sad".to_string(), 0.1), ("Happy".to_string(), 0.9)]
            .into_iter()
            .collect();
        let b: EmotionScoreVector = [("Happy".to_string(), 0.9), ("Sad".to_string(), 0.1)]
            .into_iter()
            .collect();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.insert("Sad", 0.2);
        assert_ne!(a, c);
        assert_eq!(c.labels().next(), Some("Sad"));
    }
}
