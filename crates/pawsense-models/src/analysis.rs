//! Persisted analysis results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::emotion::{EmotionScoreVector, Modality};
use crate::fusion::FusionWeights;
use crate::job::JobId;

/// Length of generated session ids.
pub const SESSION_ID_LEN: usize = 8;

/// Identifier of one stored analysis session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new short random session ID.
    pub fn new() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SESSION_ID_LEN);
        Self(id)
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Safe to use as a single path component.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 64
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Scores of one keyframe, per frame-derived modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeScores {
    /// Keyframe timestamp in seconds, rounded to centiseconds
    pub time: f64,
    pub scores: BTreeMap<Modality, EmotionScoreVector>,
}

impl KeyframeScores {
    pub fn new(timestamp_seconds: f64) -> Self {
        Self {
            time: round_centis(timestamp_seconds),
            scores: BTreeMap::new(),
        }
    }
}

fn round_centis(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

/// Final artifact of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub session_id: SessionId,
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,

    /// Input file name
    pub video: String,

    /// Keyframe threshold used
    pub threshold: f64,

    /// Fusion weights used
    pub weights: FusionWeights,

    /// Fused vector keyed by the union of all modality labels
    pub fused: EmotionScoreVector,

    /// Per-modality vectors that went into fusion
    pub modalities: BTreeMap<Modality, EmotionScoreVector>,

    /// Per-keyframe scores in extraction order
    #[serde(default)]
    pub timeline: Vec<KeyframeScores>,

    /// No keyframes were extracted; frame modalities carry uniform fallbacks
    #[serde(default)]
    pub no_signal: bool,

    #[serde(default)]
    pub keyframes: usize,
}

impl AnalysisReport {
    /// Dominant fused label, if any.
    pub fn dominant(&self) -> Option<(&str, f64)> {
        self.fused.dominant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generation() {
        let id = SessionId::new();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert!(id.is_valid());
        assert_ne!(id, SessionId::new());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(SessionId::from("a1b2c3d4").is_valid());
        assert!(!SessionId::from("").is_valid());
        assert!(!SessionId::from("../etc").is_valid());
        assert!(!SessionId::from("a/b").is_valid());
        assert!(!SessionId::from("..").is_valid());
    }

    #[test]
    fn test_keyframe_time_rounding() {
        assert_eq!(KeyframeScores::new(1.0 / 3.0).time, 0.33);
        assert_eq!(KeyframeScores::new(2.0).time, 2.0);
    }

    #[test]
    fn test_report_roundtrips_through_json() {
        let mut fused = EmotionScoreVector::new();
        fused.insert("Happy", 0.6);
        fused.insert("Sad", 0.1);

        let mut frame = KeyframeScores::new(0.5);
        frame.scores.insert(Modality::Pose, fused.clone());

        let report = AnalysisReport {
            session_id: SessionId::from("abcd1234"),
            job_id: JobId::from_string("job-1"),
            created_at: Utc::now(),
            video: "cat.mp4".to_string(),
            threshold: 30.0,
            weights: FusionWeights::default(),
            fused: fused.clone(),
            modalities: BTreeMap::from([(Modality::Pose, fused)]),
            timeline: vec![frame],
            no_signal: false,
            keyframes: 1,
        };

        let json = serde_json::to_string(&report).unwrap();
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.dominant().map(|(l, _)| l), Some("Happy"));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["weights"]["micro"], 0.4);
        assert_eq!(value["timeline"][0]["scores"]["pose"]["Happy"], 0.6);
    }
}
