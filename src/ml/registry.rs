//! Model registry
//!
//! Discovers the fixed set of artifacts once at startup. A missing or broken
//! artifact is logged and left out; the registry itself never fails to build
//! and is immutable afterwards, so it can be shared behind an `Arc` and read
//! concurrently without locking.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use super::{
    models::{StageModel, TrainedModel},
    ArtifactLoadError, FeatureBuilder, StandardScaler,
};

/// File name of the optional feature scaler
pub const SCALER_FILE: &str = "scaler.json";

/// Named model positions, declared in preference order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::AsRefStr,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ModelSlot {
    Xgboost,
    RandomForest,
}

impl ModelSlot {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn artifact_file(&self) -> String {
        format!("{}_model.json", self.as_ref())
    }

    #[cfg(feature = "ml")]
    pub fn binary_artifact_file(&self) -> String {
        format!("{}_model.bin", self.as_ref())
    }
}

/// A loaded model and the slot it occupies
#[derive(Clone)]
pub struct ModelEntry {
    pub slot: ModelSlot,
    pub model: Arc<dyn StageModel>,
}

impl ModelEntry {
    pub fn name(&self) -> &'static str {
        self.slot.name()
    }
}

/// Per-entry metadata in [`ModelStatus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_predict_proba: Option<bool>,
}

/// Snapshot of what the registry holds, for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    /// Models plus the scaler, if present
    pub models_loaded: usize,
    pub available_models: Vec<String>,
    pub model_details: BTreeMap<String, ModelDetail>,
}

#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    scaler: Option<Arc<StandardScaler>>,
}

impl ModelRegistry {
    /// Registry with nothing loaded; every prediction goes to the fallbacks
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every known artifact from `dir`, skipping whatever fails
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut registry = Self::empty();

        for slot in ModelSlot::iter() {
            match load_model(dir, slot) {
                Ok(Some(model)) => {
                    info!(model = %slot, kind = model.type_name(), "model loaded");
                    registry = registry.with_model(slot, model);
                }
                Ok(None) => debug!(model = %slot, dir = %dir.display(), "no artifact found"),
                Err(e) => warn!(model = %slot, error = %e, "model artifact skipped"),
            }
        }

        match load_scaler(&dir.join(SCALER_FILE)) {
            Ok(Some(scaler)) => {
                info!(n_features = scaler.n_features(), "feature scaler loaded");
                registry = registry.with_scaler(scaler);
            }
            Ok(None) => debug!(dir = %dir.display(), "no feature scaler found"),
            Err(e) => warn!(error = %e, "feature scaler skipped"),
        }

        if registry.is_empty() {
            warn!(dir = %dir.display(), "no models loaded, predictions will use the rule-based fallback");
        }
        registry
    }

    /// Put `model` in `slot`, replacing any previous occupant
    pub fn with_model(mut self, slot: ModelSlot, model: Arc<dyn StageModel>) -> Self {
        self.entries.retain(|e| e.slot != slot);
        self.entries.push(ModelEntry { slot, model });
        self.entries.sort_by_key(|e| e.slot);
        self
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Self {
        self.scaler = Some(Arc::new(scaler));
        self
    }

    /// Loaded models in preference order
    pub fn models(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn get(&self, slot: ModelSlot) -> Option<&Arc<dyn StageModel>> {
        self.entries.iter().find(|e| e.slot == slot).map(|e| &e.model)
    }

    pub fn available_models(&self) -> Vec<&'static str> {
        self.entries.iter().map(ModelEntry::name).collect()
    }

    /// Whether the named model reports class probabilities; `None` if absent
    pub fn supports_probabilities(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.model.supports_probabilities())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scaler(&self) -> Option<Arc<StandardScaler>> {
        self.scaler.clone()
    }

    pub fn feature_builder(&self) -> FeatureBuilder {
        FeatureBuilder::new(self.scaler.clone())
    }

    pub fn model_status(&self) -> ModelStatus {
        let mut available_models: Vec<String> =
            self.entries.iter().map(|e| e.name().to_string()).collect();
        let mut model_details: BTreeMap<String, ModelDetail> = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.name().to_string(),
                    ModelDetail {
                        kind: e.model.type_name().to_string(),
                        status: "loaded".to_string(),
                        has_predict_proba: Some(e.model.supports_probabilities()),
                    },
                )
            })
            .collect();

        if self.scaler.is_some() {
            available_models.push("scaler".to_string());
            model_details.insert(
                "scaler".to_string(),
                ModelDetail {
                    kind: "preprocessor".to_string(),
                    status: "loaded".to_string(),
                    has_predict_proba: None,
                },
            );
        }

        ModelStatus {
            models_loaded: available_models.len(),
            available_models,
            model_details,
        }
    }
}

fn load_model(dir: &Path, slot: ModelSlot) -> Result<Option<Arc<dyn StageModel>>, ArtifactLoadError> {
    let json_path = dir.join(slot.artifact_file());
    if let Some(model) = read_json::<TrainedModel>(&json_path)? {
        model.validate().map_err(|reason| ArtifactLoadError::Invalid {
            path: json_path.display().to_string(),
            reason,
        })?;
        return Ok(Some(Arc::new(model)));
    }

    #[cfg(feature = "ml")]
    {
        let bin_path = dir.join(slot.binary_artifact_file());
        if let Some(bytes) = read_bytes(&bin_path)? {
            let model = super::smartcore::SmartcoreForest::from_bytes(&bytes).map_err(|reason| {
                ArtifactLoadError::Decode {
                    path: bin_path.display().to_string(),
                    reason,
                }
            })?;
            return Ok(Some(Arc::new(model)));
        }
    }

    Ok(None)
}

fn load_scaler(path: &Path) -> Result<Option<StandardScaler>, ArtifactLoadError> {
    let Some(scaler) = read_json::<StandardScaler>(path)? else {
        return Ok(None);
    };
    scaler.validate().map_err(|e| ArtifactLoadError::Invalid {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some(scaler))
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, ArtifactLoadError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ArtifactLoadError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ArtifactLoadError> {
    let Some(bytes) = read_bytes(path)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ArtifactLoadError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{LinearStageRegressor, TrainedModel};
    use crate::ml::FEATURE_COUNT;
    use std::str::FromStr;

    fn linear(intercept: f64) -> TrainedModel {
        TrainedModel::Linear(LinearStageRegressor {
            coefficients: vec![0.0; FEATURE_COUNT],
            intercept,
        })
    }

    fn write_json(dir: &Path, file: &str, value: &impl Serialize) {
        std::fs::write(dir.join(file), serde_json::to_vec(value).unwrap()).unwrap();
    }

    #[test]
    fn test_slot_names_and_order() {
        assert_eq!(ModelSlot::Xgboost.to_string(), "xgboost");
        assert_eq!(ModelSlot::RandomForest.to_string(), "random_forest");
        assert_eq!(ModelSlot::from_str("random_forest").unwrap(), ModelSlot::RandomForest);
        assert_eq!(ModelSlot::Xgboost.artifact_file(), "xgboost_model.json");
        assert!(ModelSlot::Xgboost < ModelSlot::RandomForest);
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::load(dir.path());
        assert!(registry.is_empty());
        assert!(registry.scaler().is_none());

        let status = registry.model_status();
        assert_eq!(status.models_loaded, 0);
        assert!(status.available_models.is_empty());
    }

    #[test]
    fn test_load_missing_directory_is_not_fatal() {
        let registry = ModelRegistry::load("/definitely/not/a/model/dir");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_skips_corrupt_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("xgboost_model.json"), b"{ not json").unwrap();
        write_json(dir.path(), "random_forest_model.json", &linear(2.0));
        write_json(
            dir.path(),
            SCALER_FILE,
            &StandardScaler::new(vec![0.0; 3], vec![1.0; 3]),
        );

        let registry = ModelRegistry::load(dir.path());
        assert_eq!(registry.available_models(), vec!["random_forest"]);
        assert!(registry.get(ModelSlot::Xgboost).is_none());
        assert!(registry.scaler().is_none());
    }

    #[test]
    fn test_load_full_set() {
        let dir = tempfile::tempdir().unwrap();
        write_json(
            dir.path(),
            "xgboost_model.json",
            &TrainedModel::TreeEnsemble(crate::ml::models::tests::demand_stump()),
        );
        write_json(dir.path(), "random_forest_model.json", &linear(1.0));
        write_json(
            dir.path(),
            SCALER_FILE,
            &StandardScaler::new(vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]),
        );

        let registry = ModelRegistry::load(dir.path());
        assert_eq!(registry.available_models(), vec!["xgboost", "random_forest"]);
        assert_eq!(registry.supports_probabilities("xgboost"), Some(true));
        assert_eq!(registry.supports_probabilities("random_forest"), Some(false));
        assert_eq!(registry.supports_probabilities("lstm"), None);
        assert!(registry.feature_builder().has_scaler());

        let status = registry.model_status();
        assert_eq!(status.models_loaded, 3);
        assert_eq!(status.available_models, vec!["xgboost", "random_forest", "scaler"]);
        assert_eq!(status.model_details["scaler"].kind, "preprocessor");
        assert_eq!(status.model_details["xgboost"].kind, "TreeEnsemble");
        assert_eq!(status.model_details["random_forest"].has_predict_proba, Some(false));
    }

    #[test]
    fn test_with_model_keeps_preference_order() {
        let registry = ModelRegistry::empty()
            .with_model(ModelSlot::RandomForest, Arc::new(linear(1.0)))
            .with_model(ModelSlot::Xgboost, Arc::new(linear(2.0)))
            .with_model(ModelSlot::RandomForest, Arc::new(linear(3.0)));

        assert_eq!(registry.available_models(), vec!["xgboost", "random_forest"]);
        assert_eq!(registry.models().len(), 2);
    }
}
