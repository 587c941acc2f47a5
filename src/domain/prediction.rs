use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest load-shedding stage the service will ever report
pub const MAX_STAGE: u8 = 8;

pub const DEFAULT_TEMPERATURE_C: f64 = 25.0;
pub const DEFAULT_HUMIDITY_PERCENT: f64 = 60.0;
pub const DEFAULT_WIND_SPEED: f64 = 10.0;
pub const DEFAULT_DEMAND_MW: f64 = 30_000.0;
pub const DEFAULT_GENERATION_MW: f64 = 28_000.0;
pub const DEFAULT_HISTORICAL_AVG: f64 = 1.5;

/// Tag written to `model_used` by the rule-based tier
pub const RULE_BASED_FALLBACK: &str = "rule_based_fallback";
/// Tag written to `model_used` by the last-resort tier
pub const EMERGENCY_FALLBACK: &str = "emergency_fallback";

/// Input record for a single prediction
///
/// The optional signals are normally filled in from the data sources before
/// the record reaches the resolver; anything still missing falls back to the
/// defaults above through the accessor methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub location: String,
    pub timestamp: DateTime<FixedOffset>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Forecast demand (MW)
    pub demand_forecast: Option<f64>,
    /// Available generation (MW)
    pub generation_capacity: Option<f64>,
    /// Average stage observed at this location and hour
    pub historical_avg: Option<f64>,
}

impl PredictionInput {
    pub fn new(location: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            location: location.into(),
            timestamp,
            temperature: None,
            humidity: None,
            wind_speed: None,
            demand_forecast: None,
            generation_capacity: None,
            historical_avg: None,
        }
    }

    pub fn with_grid(mut self, demand_mw: f64, generation_mw: f64) -> Self {
        self.demand_forecast = Some(demand_mw);
        self.generation_capacity = Some(generation_mw);
        self
    }

    pub fn with_weather(mut self, temperature: f64, humidity: f64, wind_speed: f64) -> Self {
        self.temperature = Some(temperature);
        self.humidity = Some(humidity);
        self.wind_speed = Some(wind_speed);
        self
    }

    pub fn with_historical_avg(mut self, avg: f64) -> Self {
        self.historical_avg = Some(avg);
        self
    }

    pub fn temperature_or_default(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE_C)
    }

    pub fn humidity_or_default(&self) -> f64 {
        self.humidity.unwrap_or(DEFAULT_HUMIDITY_PERCENT)
    }

    pub fn wind_speed_or_default(&self) -> f64 {
        self.wind_speed.unwrap_or(DEFAULT_WIND_SPEED)
    }

    pub fn demand_or_default(&self) -> f64 {
        self.demand_forecast.unwrap_or(DEFAULT_DEMAND_MW)
    }

    pub fn generation_or_default(&self) -> f64 {
        self.generation_capacity.unwrap_or(DEFAULT_GENERATION_MW)
    }

    pub fn historical_avg_or_default(&self) -> f64 {
        self.historical_avg.unwrap_or(DEFAULT_HISTORICAL_AVG)
    }
}

/// Which tier of the cascade produced a result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ModelUsed {
    /// A registered model, by registry name
    Model(String),
    RuleBasedFallback,
    EmergencyFallback,
}

impl ModelUsed {
    pub fn as_str(&self) -> &str {
        match self {
            ModelUsed::Model(name) => name,
            ModelUsed::RuleBasedFallback => RULE_BASED_FALLBACK,
            ModelUsed::EmergencyFallback => EMERGENCY_FALLBACK,
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self, ModelUsed::Model(_))
    }
}

impl fmt::Display for ModelUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ModelUsed> for String {
    fn from(value: ModelUsed) -> Self {
        value.as_str().to_string()
    }
}

impl From<String> for ModelUsed {
    fn from(value: String) -> Self {
        match value.as_str() {
            RULE_BASED_FALLBACK => ModelUsed::RuleBasedFallback,
            EMERGENCY_FALLBACK => ModelUsed::EmergencyFallback,
            _ => ModelUsed::Model(value),
        }
    }
}

/// Strategy-specific fields attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Diagnostics {
    Model {
        features_used: usize,
    },
    RuleBased {
        deficit_ratio: f64,
        is_peak_hour: bool,
    },
    Emergency {
        error: String,
    },
}

/// Outcome of the prediction cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_stage: u8,
    pub confidence_score: f64,
    pub model_used: ModelUsed,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub diagnostics: Diagnostics,
}

impl PredictionResult {
    /// Build a result, enforcing the stage and confidence bounds
    pub fn new(stage: i64, confidence: f64, model_used: ModelUsed, diagnostics: Diagnostics) -> Self {
        Self {
            predicted_stage: clamp_stage(stage),
            confidence_score: round_to(clamp_confidence(confidence), 3),
            model_used,
            timestamp: Utc::now(),
            diagnostics,
        }
    }
}

/// Clamp any integer stage into `0..=MAX_STAGE`
pub fn clamp_stage(stage: i64) -> u8 {
    stage.clamp(0, MAX_STAGE as i64) as u8
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
