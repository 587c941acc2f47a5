//! Rule-based stage estimator
//!
//! Maps the supply/demand deficit, weighted up during peak hours, onto a
//! stage through a fixed threshold table. A small seeded perturbation keeps
//! the output from looking falsely certain.

use rand::Rng;
use thiserror::Error;

use crate::domain::{is_peak_hour, round_to, MAX_STAGE};

/// Chance that a rule-based estimate is nudged by one stage
pub const PERTURBATION_PROBABILITY: f64 = 0.10;
/// Confidence multiplier applied to a nudged estimate
pub const PERTURBED_CONFIDENCE_FACTOR: f64 = 0.9;
/// Deficit weighting inside peak windows
pub const PEAK_MULTIPLIER: f64 = 1.3;

/// Upper bounds (exclusive) on the adjusted ratio with their stage and confidence
const THRESHOLDS: [(f64, u8, f64); 5] = [
    (0.02, 0, 0.85),
    (0.05, 1, 0.75),
    (0.08, 2, 0.70),
    (0.12, 3, 0.65),
    (0.16, 4, 0.60),
];
const SEVERE_CONFIDENCE: f64 = 0.55;
const SEVERE_SCALE: f64 = 25.0;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("{name} is not a finite number: {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("hour of day out of range: {0}")]
    InvalidHour(u32),
}

/// Output of the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleEstimate {
    pub stage: u8,
    pub confidence: f64,
    /// Unweighted deficit ratio, rounded to 4 places
    pub deficit_ratio: f64,
    pub adjusted_ratio: f64,
    pub is_peak_hour: bool,
    pub perturbed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleBasedEstimator {
    perturbation_probability: f64,
}

impl Default for RuleBasedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedEstimator {
    pub fn new() -> Self {
        Self {
            perturbation_probability: PERTURBATION_PROBABILITY,
        }
    }

    /// Override the perturbation chance (clamped to `[0, 1]`)
    pub fn with_perturbation_probability(probability: f64) -> Self {
        let p = if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            perturbation_probability: p,
        }
    }

    pub fn perturbation_probability(&self) -> f64 {
        self.perturbation_probability
    }

    /// Estimate with the random perturbation drawn from `rng`
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        demand_mw: f64,
        generation_mw: f64,
        hour: u32,
        rng: &mut R,
    ) -> Result<RuleEstimate, EstimatorError> {
        let mut estimate = Self::base_estimate(demand_mw, generation_mw, hour)?;

        if rng.gen_bool(self.perturbation_probability) {
            let delta: i16 = if rng.gen_bool(0.5) { 1 } else { -1 };
            estimate.stage = (estimate.stage as i16 + delta).clamp(0, MAX_STAGE as i16) as u8;
            estimate.confidence *= PERTURBED_CONFIDENCE_FACTOR;
            estimate.perturbed = true;
        }
        Ok(estimate)
    }

    /// Deterministic part of the estimate, without perturbation
    pub fn base_estimate(
        demand_mw: f64,
        generation_mw: f64,
        hour: u32,
    ) -> Result<RuleEstimate, EstimatorError> {
        if !demand_mw.is_finite() {
            return Err(EstimatorError::NonFinite { name: "demand_forecast", value: demand_mw });
        }
        if !generation_mw.is_finite() {
            return Err(EstimatorError::NonFinite {
                name: "generation_capacity",
                value: generation_mw,
            });
        }
        if hour > 23 {
            return Err(EstimatorError::InvalidHour(hour));
        }

        let deficit = (demand_mw - generation_mw).max(0.0);
        let deficit_ratio = if demand_mw > 0.0 { deficit / demand_mw } else { 0.0 };

        let is_peak = is_peak_hour(hour);
        let multiplier = if is_peak { PEAK_MULTIPLIER } else { 1.0 };
        let adjusted_ratio = deficit_ratio * multiplier;

        let (stage, confidence) = stage_for_ratio(adjusted_ratio);

        Ok(RuleEstimate {
            stage,
            confidence,
            deficit_ratio: round_to(deficit_ratio, 4),
            adjusted_ratio,
            is_peak_hour: is_peak,
            perturbed: false,
        })
    }
}

/// Threshold table lookup for an adjusted deficit ratio
pub fn stage_for_ratio(adjusted_ratio: f64) -> (u8, f64) {
    THRESHOLDS
        .iter()
        .find(|(limit, _, _)| adjusted_ratio < *limit)
        .map(|&(_, stage, confidence)| (stage, confidence))
        .unwrap_or_else(|| {
            let stage = (adjusted_ratio * SEVERE_SCALE).floor().min(MAX_STAGE as f64) as u8;
            (stage, SEVERE_CONFIDENCE)
        })
}
