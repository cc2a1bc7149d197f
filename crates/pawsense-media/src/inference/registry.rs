//! Process-wide model store.

use std::collections::BTreeMap;
use std::sync::Arc;

use pawsense_models::Modality;
use tracing::info;

use super::{InferenceAdapter, ModelSpec, OnnxAdapter};
use crate::error::{MediaError, MediaResult};

/// One loaded adapter per modality, shared read-only across jobs.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    adapters: BTreeMap<Modality, Arc<dyn InferenceAdapter>>,
}

impl ModelRegistry {
    /// Load and validate every declared model.
    ///
    /// A missing or corrupt file, a duplicate modality, or an output width
    /// that differs from the declared label count fails the whole load.
    pub fn load(specs: &[ModelSpec]) -> MediaResult<Self> {
        let mut adapters: BTreeMap<Modality, Arc<dyn InferenceAdapter>> = BTreeMap::new();

        for spec in specs {
            if adapters.contains_key(&spec.modality) {
                return Err(MediaError::model_load(
                    &spec.path,
                    format!("duplicate model for modality {}", spec.modality),
                ));
            }

            let adapter = OnnxAdapter::load(spec.clone())?;
            let width = adapter.warm_up()?;
            if width != spec.labels.len() {
                return Err(MediaError::model_load(
                    &spec.path,
                    format!(
                        "model outputs {width} scores but declares {} labels",
                        spec.labels.len()
                    ),
                ));
            }

            adapters.insert(spec.modality, Arc::new(adapter));
        }

        info!(
            models = adapters.len(),
            modalities = ?adapters.keys().collect::<Vec<_>>(),
            "Model registry ready"
        );

        Ok(Self { adapters })
    }

    /// Build from already-constructed adapters. Later entries replace earlier
    /// ones of the same modality.
    pub fn from_adapters(adapters: impl IntoIterator<Item = Arc<dyn InferenceAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.modality(), a)).collect(),
        }
    }

    pub fn get(&self, modality: Modality) -> Option<Arc<dyn InferenceAdapter>> {
        self.adapters.get(&modality).cloned()
    }

    pub fn contains(&self, modality: Modality) -> bool {
        self.adapters.contains_key(&modality)
    }

    pub fn modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        self.adapters.keys().copied()
    }

    /// Adapters scored per keyframe, in modality order.
    pub fn frame_adapters(&self) -> Vec<Arc<dyn InferenceAdapter>> {
        self.adapters
            .iter()
            .filter(|(m, _)| m.is_frame_derived())
            .map(|(_, a)| Arc::clone(a))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("modalities", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
