//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use pawsense_media::ModelSpec;
use pawsense_models::{FusionWeights, Modality, DEFAULT_KEYFRAME_THRESHOLD};

use crate::error::{WorkerError, WorkerResult};

/// Value of a `PAWSENSE_*_MODEL` variable that disables the modality.
pub const DISABLED_MODEL: &str = "none";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Mean absolute luma difference needed to keep a frame (0-255 scale)
    pub keyframe_threshold: f64,
    /// Fusion weight per modality
    pub weights: FusionWeights,
    /// Models to load, one per enabled modality
    pub models: Vec<ModelSpec>,
    /// Per-job deadline; `None` waits indefinitely
    pub job_timeout: Option<Duration>,
    /// Root directory of stored sessions
    pub sessions_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyframe_threshold: DEFAULT_KEYFRAME_THRESHOLD,
            weights: FusionWeights::default(),
            models: Modality::ALL.iter().map(|m| ModelSpec::default_for(*m)).collect(),
            job_timeout: Some(Duration::from_secs(600)),
            sessions_dir: PathBuf::from("uploads"),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// set but malformed numeric values are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let defaults = Self::default();

        let keyframe_threshold =
            parse_var(&lookup, "PAWSENSE_KEYFRAME_THRESHOLD")?.unwrap_or(defaults.keyframe_threshold);

        let mut weights = defaults.weights;
        for modality in Modality::ALL {
            let key = format!("PAWSENSE_WEIGHT_{}", modality.as_str().to_uppercase());
            if let Some(weight) = parse_var::<f64>(&lookup, &key)? {
                weights.set(modality, weight);
            }
        }

        let mut models = Vec::new();
        for modality in Modality::ALL {
            let name = modality.as_str().to_uppercase();
            let mut spec = ModelSpec::default_for(modality);
            match lookup(&format!("PAWSENSE_{name}_MODEL")).map(|v| v.trim().to_string()) {
                Some(v) if v.eq_ignore_ascii_case(DISABLED_MODEL) => continue,
                Some(v) if !v.is_empty() => spec = spec.with_path(v),
                _ => {}
            }
            if let Some(output) = lookup(&format!("PAWSENSE_{name}_OUTPUT")) {
                let output = output.trim();
                if !output.is_empty() {
                    spec = spec.with_output_name(output);
                }
            }
            models.push(spec);
        }

        let job_timeout = match parse_var::<u64>(&lookup, "PAWSENSE_JOB_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.job_timeout,
        };

        let sessions_dir = lookup("PAWSENSE_SESSIONS_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.sessions_dir);

        Ok(Self {
            keyframe_threshold,
            weights,
            models,
            job_timeout,
            sessions_dir,
        })
    }

    /// Modalities with a model configured.
    pub fn enabled_modalities(&self) -> Vec<Modality> {
        self.models.iter().map(|spec| spec.modality).collect()
    }
}

/// Check a threshold and weights against the set of enabled modalities.
///
/// Weights must pass [`FusionWeights::validate`] and cover every enabled
/// modality, at least one modality must be enabled, and the threshold must be
/// a finite non-negative number.
pub fn validate_pipeline(
    threshold: f64,
    weights: &FusionWeights,
    enabled: impl IntoIterator<Item = Modality>,
) -> WorkerResult<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(WorkerError::config_error(format!(
            "keyframe threshold must be a finite non-negative number, got {threshold}"
        )));
    }

    weights.validate()?;

    let mut any = false;
    for modality in enabled {
        any = true;
        if !weights.covers(modality) {
            return Err(WorkerError::config_error(format!(
                "no fusion weight for enabled modality {modality}"
            )));
        }
    }
    if !any {
        return Err(WorkerError::config_error("no modality enabled"));
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> WorkerResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WorkerError::config_error(format!("{key}: cannot parse {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.keyframe_threshold, 30.0);
        assert_eq!(config.weights, FusionWeights::default());
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.job_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.sessions_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("PAWSENSE_KEYFRAME_THRESHOLD", "12.5"),
            ("PAWSENSE_WEIGHT_AUDIO", "0.5"),
            ("PAWSENSE_WEIGHT_POSE", "0.5"),
            ("PAWSENSE_WEIGHT_MICRO", "0"),
            ("PAWSENSE_MICRO_MODEL", "none"),
            ("PAWSENSE_POSE_MODEL", "/opt/pose.onnx"),
            ("PAWSENSE_POSE_OUTPUT", " probabilities "),
            ("PAWSENSE_JOB_TIMEOUT_SECS", "0"),
            ("PAWSENSE_SESSIONS_DIR", "/var/pawsense"),
        ]))
        .unwrap();

        assert_eq!(config.keyframe_threshold, 12.5);
        assert_eq!(config.weights.get(Modality::Audio), Some(0.5));
        assert_eq!(config.enabled_modalities(), vec![Modality::Audio, Modality::Pose]);
        assert_eq!(config.models[1].path, PathBuf::from("/opt/pose.onnx"));
        assert_eq!(config.models[1].output_name.as_deref(), Some("probabilities"));
        assert!(config.models[0].output_name.is_none());
        assert_eq!(config.job_timeout, None);
        assert_eq!(config.sessions_dir, PathBuf::from("/var/pawsense"));
        validate_pipeline(
            config.keyframe_threshold,
            &config.weights,
            config.enabled_modalities(),
        )
        .unwrap();
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("PAWSENSE_WEIGHT_POSE", "heavy")])).unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));
    }

    #[test]
    fn test_validate_pipeline() {
        let weights = FusionWeights::default();
        assert!(validate_pipeline(30.0, &weights, Modality::ALL).is_ok());
        assert!(validate_pipeline(-1.0, &weights, Modality::ALL).is_err());
        assert!(validate_pipeline(f64::NAN, &weights, Modality::ALL).is_err());
        assert!(validate_pipeline(30.0, &weights, []).is_err());

        let partial = FusionWeights::new([(Modality::Audio, 1.0)]);
        assert!(validate_pipeline(30.0, &partial, [Modality::Audio]).is_ok());
        assert!(matches!(
            validate_pipeline(30.0, &partial, [Modality::Audio, Modality::Pose]),
            Err(WorkerError::ConfigError(_))
        ));

        let bad_sum = FusionWeights::new([(Modality::Audio, 0.5), (Modality::Pose, 0.2)]);
        assert!(matches!(
            validate_pipeline(30.0, &bad_sum, [Modality::Audio]),
            Err(WorkerError::Fusion(_))
        ));
    }
}
