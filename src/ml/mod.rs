//! Machine Learning Module
//!
//! Everything needed to turn a [`PredictionInput`](crate::domain::PredictionInput)
//! into a model-ready vector and run it through the trained stage classifiers:
//! - Feature engineering (fixed 11-column layout)
//! - Artifact formats for the classifiers and the feature scaler
//! - The registry that discovers artifacts at startup

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod features;
pub mod models;
pub mod registry;
pub mod scaler;

#[cfg(feature = "ml")]
pub mod smartcore;

pub use features::FeatureBuilder;
pub use models::{StageModel, TrainedModel};
pub use registry::{ModelRegistry, ModelSlot, ModelStatus};
pub use scaler::StandardScaler;

/// Number of columns in every feature vector
pub const FEATURE_COUNT: usize = 11;

/// Column names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temperature",
    "humidity",
    "wind_speed",
    "demand_forecast",
    "generation_capacity",
    "historical_avg",
    "hour",
    "day_of_week",
    "month",
    "is_peak_hour",
    "is_weekday",
];

/// Vector returned whenever feature preparation fails
pub const DEFAULT_FEATURES: [f64; FEATURE_COUNT] =
    [25.0, 60.0, 10.0, 30_000.0, 28_000.0, 1.5, 12.0, 1.0, 6.0, 0.0, 1.0];

/// Feature preparation failures
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Feature '{name}' is not a finite number: {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("Scaler expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Scaler has {mean} means but {scale} scales")]
    ScalerShape { mean: usize, scale: usize },
}

/// Model inference failures
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Model does not provide class probabilities")]
    ProbabilitiesUnsupported,
    #[error("Model produced an invalid output: {0}")]
    InvalidOutput(String),
    #[error("Model backend failed: {0}")]
    Backend(String),
}

/// Artifact loading failures
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode artifact {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Artifact {path} is invalid: {reason}")]
    Invalid { path: String, reason: String },
}

/// Fixed-layout feature vector for the stage classifiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(features: [f64; FEATURE_COUNT]) -> Self {
        Self { features }
    }

    pub fn neutral_default() -> Self {
        Self::new(DEFAULT_FEATURES)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.features
    }

    /// Value of a named column
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.features[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vector_layout() {
        let fv = FeatureVector::neutral_default();
        assert_eq!(fv.len(), FEATURE_COUNT);
        assert_eq!(fv.get("temperature"), Some(25.0));
        assert_eq!(fv.get("demand_forecast"), Some(30_000.0));
        assert_eq!(fv.get("hour"), Some(12.0));
        assert_eq!(fv.get("is_weekday"), Some(1.0));
        assert_eq!(fv.get("unknown"), None);
    }

    #[test]
    fn test_feature_names_unique() {
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }
}
