//! Feature engineering for the stage classifiers
//!
//! Builds the fixed 11-column vector from an input record: the six signal
//! values followed by calendar features derived from the timestamp.

use chrono::{Datelike, Timelike};
use std::sync::Arc;
use tracing::warn;

use super::{FeatureError, FeatureVector, StandardScaler, FEATURE_COUNT, FEATURE_NAMES};
use crate::domain::{is_peak_hour, PredictionInput};

/// Calendar features extracted from a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFeatures {
    /// Hour of day (0-23)
    pub hour_of_day: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    pub is_peak_hour: bool,
    pub is_weekday: bool,
}

impl TemporalFeatures {
    pub fn from_input(input: &PredictionInput) -> Self {
        let ts = input.timestamp;
        let hour_of_day = ts.hour();
        let day_of_week = ts.weekday().num_days_from_monday();
        Self {
            hour_of_day,
            day_of_week,
            month: ts.month(),
            is_peak_hour: is_peak_hour(hour_of_day),
            is_weekday: day_of_week < 5,
        }
    }
}

/// Converts input records into (optionally scaled) feature vectors
#[derive(Clone, Default)]
pub struct FeatureBuilder {
    scaler: Option<Arc<StandardScaler>>,
}

impl FeatureBuilder {
    pub fn new(scaler: Option<Arc<StandardScaler>>) -> Self {
        Self { scaler }
    }

    pub fn has_scaler(&self) -> bool {
        self.scaler.is_some()
    }

    /// Build the vector, substituting the neutral default on any failure
    pub fn build(&self, input: &PredictionInput) -> FeatureVector {
        match self.try_build(input) {
            Ok(fv) => fv,
            Err(e) => {
                warn!(location = %input.location, error = %e, "feature preparation failed, using default vector");
                FeatureVector::neutral_default()
            }
        }
    }

    pub fn try_build(&self, input: &PredictionInput) -> Result<FeatureVector, FeatureError> {
        let raw = raw_features(input);
        for (&name, &value) in FEATURE_NAMES.iter().zip(raw.iter()) {
            if !value.is_finite() {
                return Err(FeatureError::NonFinite { name, value });
            }
        }

        let fv = FeatureVector::new(raw);
        match &self.scaler {
            Some(scaler) => scaler.transform(&fv),
            None => Ok(fv),
        }
    }
}

/// Unscaled feature values in vector order
pub fn raw_features(input: &PredictionInput) -> [f64; FEATURE_COUNT] {
    let t = TemporalFeatures::from_input(input);
    [
        input.temperature_or_default(),
        input.humidity_or_default(),
        input.wind_speed_or_default(),
        input.demand_or_default(),
        input.generation_or_default(),
        input.historical_avg_or_default(),
        t.hour_of_day as f64,
        t.day_of_week as f64,
        t.month as f64,
        if t.is_peak_hour { 1.0 } else { 0.0 },
        if t.is_weekday { 1.0 } else { 0.0 },
    ]
}
