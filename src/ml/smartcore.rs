//! SmartCore random forest wrapper
//!
//! Lets a bincode-serialized `RandomForestClassifier` occupy a registry slot
//! (`<slot>_model.bin`). SmartCore forests only expose hard labels here, so
//! the resolver falls back to its default confidence for them.

use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::{models::StageModel, FeatureVector, InferenceError, FEATURE_COUNT};

type Forest = RandomForestClassifier<f64, i64, DenseMatrix<f64>, Vec<i64>>;

pub struct SmartcoreForest {
    model: Forest,
}

impl SmartcoreForest {
    /// Fit a forest on rows of the 11-column feature layout
    pub fn train(x: &[[f64; FEATURE_COUNT]], y: &[i64]) -> anyhow::Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} rows, {} targets",
                x.len(),
                y.len()
            );
        }

        let flat: Vec<f64> = x.iter().flat_map(|row| row.iter().copied()).collect();
        let x_matrix = DenseMatrix::new(x.len(), FEATURE_COUNT, flat, false);
        let model = RandomForestClassifier::fit(
            &x_matrix,
            &y.to_vec(),
            RandomForestClassifierParameters::default(),
        )
        .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        Ok(Self { model })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(&self.model).map_err(|e| format!("Failed to serialize model: {e}"))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let model: Forest =
            bincode::deserialize(bytes).map_err(|e| format!("Failed to deserialize model: {e}"))?;
        Ok(Self { model })
    }
}

impl StageModel for SmartcoreForest {
    fn predict_stage(&self, features: &FeatureVector) -> Result<i64, InferenceError> {
        let x = DenseMatrix::new(1, FEATURE_COUNT, features.features.to_vec(), false);
        let labels = self
            .model
            .predict(&x)
            .map_err(|e| InferenceError::Backend(format!("{e:?}")))?;
        labels
            .first()
            .copied()
            .ok_or_else(|| InferenceError::InvalidOutput("empty prediction".to_string()))
    }

    fn type_name(&self) -> &'static str {
        "RandomForestClassifier"
    }
}
