//! Z-score feature scaler loaded from `scaler.json`

use serde::{Deserialize, Serialize};

use super::{FeatureError, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Per-column standardization: `(x - mean) / scale`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self { mean, scale }
    }

    /// Number of columns this scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Check parameter shape against the fixed feature layout
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.mean.len() != self.scale.len() {
            return Err(FeatureError::ScalerShape {
                mean: self.mean.len(),
                scale: self.scale.len(),
            });
        }
        if self.mean.len() != FEATURE_COUNT {
            return Err(FeatureError::DimensionMismatch {
                expected: self.mean.len(),
                actual: FEATURE_COUNT,
            });
        }
        Ok(())
    }

    pub fn transform(&self, input: &FeatureVector) -> Result<FeatureVector, FeatureError> {
        self.validate()?;

        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in input.features.iter().enumerate() {
            // zero-variance columns are passed through centred, as sklearn does
            let scale = if self.scale[i].abs() < 1e-12 { 1.0 } else { self.scale[i] };
            let scaled = (value - self.mean[i]) / scale;
            if !scaled.is_finite() {
                return Err(FeatureError::NonFinite {
                    name: FEATURE_NAMES[i],
                    value: scaled,
                });
            }
            out[i] = scaled;
        }
        Ok(FeatureVector::new(out))
    }
}
