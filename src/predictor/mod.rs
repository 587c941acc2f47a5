//! Prediction cascade
//!
//! Resolves an input to a stage by trying, in order: a cached result, every
//! loaded model in preference order, the rule-based estimator, and finally
//! the emergency tier. Each attempt reports its own `Result`; a failure is
//! logged and the next strategy runs. The emergency tier cannot fail, so
//! [`PredictionResolver::predict`] always returns a bounded result.

pub mod fingerprint;
pub mod rules;

pub use fingerprint::{prediction_cache_key, PREDICTION_KEY_PREFIX};
pub use rules::{EstimatorError, RuleBasedEstimator, RuleEstimate};

use chrono::Timelike;
use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{get_json, set_json, CacheStore};
use crate::domain::{Diagnostics, ModelUsed, PredictionInput, PredictionResult};
use crate::ml::registry::ModelEntry;
use crate::ml::{FeatureBuilder, FeatureVector, InferenceError, ModelRegistry};

/// How long a resolved prediction stays cached
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(300);
/// Confidence reported by models that cannot produce probabilities
pub const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;
/// Weighted draw used by the emergency tier
pub const EMERGENCY_STAGES: [i64; 5] = [0, 1, 2, 2, 3];
pub const EMERGENCY_CONFIDENCE: f64 = 0.5;

/// Why a single cascade step gave up
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("model {model} failed: {source}")]
    Model {
        model: &'static str,
        #[source]
        source: InferenceError,
    },
    #[error("rule-based estimate failed: {0}")]
    RuleBased(#[from] EstimatorError),
}

enum Strategy<'a> {
    Model(&'a ModelEntry),
    RuleBased,
}

/// Counters for each way a prediction was resolved
#[derive(Debug, Default)]
pub struct ResolverStats {
    cache_hits: AtomicU64,
    model: AtomicU64,
    rule_based: AtomicU64,
    emergency: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverStatsSnapshot {
    pub cache_hits: u64,
    pub model: u64,
    pub rule_based: u64,
    pub emergency: u64,
}

impl ResolverStats {
    pub fn snapshot(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            model: self.model.load(Ordering::Relaxed),
            rule_based: self.rule_based.load(Ordering::Relaxed),
            emergency: self.emergency.load(Ordering::Relaxed),
        }
    }
}

pub struct PredictionResolver {
    registry: Arc<ModelRegistry>,
    features: FeatureBuilder,
    cache: Arc<dyn CacheStore>,
    estimator: RuleBasedEstimator,
    rng: Mutex<StdRng>,
    result_ttl: Duration,
    stats: ResolverStats,
}

impl PredictionResolver {
    pub fn new(registry: Arc<ModelRegistry>, cache: Arc<dyn CacheStore>) -> Self {
        let features = registry.feature_builder();
        Self {
            registry,
            features,
            cache,
            estimator: RuleBasedEstimator::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            result_ttl: DEFAULT_RESULT_TTL,
            stats: ResolverStats::default(),
        }
    }

    /// Make the perturbation and emergency draws reproducible
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        }
        self
    }

    pub fn with_estimator(mut self, estimator: RuleBasedEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn stats(&self) -> ResolverStatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve `input` to a stage; never fails
    pub fn predict(&self, input: &PredictionInput) -> PredictionResult {
        let key = prediction_cache_key(input);

        if let Some(hit) = get_json::<PredictionResult>(self.cache.as_ref(), &key) {
            debug!(key = %key, model = %hit.model_used, "prediction cache hit");
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        let mut features: Option<FeatureVector> = None;
        let mut last_error: Option<AttemptError> = None;

        for strategy in self.strategies() {
            let attempt = match strategy {
                Strategy::Model(entry) => {
                    let fv = features.get_or_insert_with(|| self.features.build(input));
                    self.try_model(entry, fv)
                }
                Strategy::RuleBased => self.try_rule_based(input),
            };

            match attempt {
                Ok(result) => {
                    set_json(self.cache.as_ref(), &key, &result, self.result_ttl);
                    return result;
                }
                Err(e) => {
                    warn!(location = %input.location, error = %e, "prediction attempt failed, trying next strategy");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no prediction strategy succeeded".to_string());
        self.emergency(input, reason)
    }

    fn strategies(&self) -> impl Iterator<Item = Strategy<'_>> {
        self.registry
            .models()
            .iter()
            .map(Strategy::Model)
            .chain(std::iter::once(Strategy::RuleBased))
    }

    fn try_model(
        &self,
        entry: &ModelEntry,
        features: &FeatureVector,
    ) -> Result<PredictionResult, AttemptError> {
        let model = entry.name();
        let wrap = |source| AttemptError::Model { model, source };

        let stage = entry.model.predict_stage(features).map_err(wrap)?;
        let confidence = if entry.model.supports_probabilities() {
            let proba = entry.model.predict_proba(features).map_err(wrap)?;
            // allow for float error from averaging normalized leaves
            if proba.is_empty() || proba.iter().any(|p| !(0.0..=1.0 + 1e-9).contains(p)) {
                return Err(wrap(InferenceError::InvalidOutput(format!(
                    "invalid class probabilities: {proba:?}"
                ))));
            }
            proba.iter().copied().fold(0.0, f64::max)
        } else {
            DEFAULT_MODEL_CONFIDENCE
        };

        let result = PredictionResult::new(
            stage,
            confidence,
            ModelUsed::Model(model.to_string()),
            Diagnostics::Model { features_used: features.len() },
        );
        self.stats.model.fetch_add(1, Ordering::Relaxed);
        info!(model, stage = result.predicted_stage, confidence = result.confidence_score, "model prediction");
        Ok(result)
    }

    fn try_rule_based(&self, input: &PredictionInput) -> Result<PredictionResult, AttemptError> {
        let estimate = {
            let mut rng = self.rng.lock();
            self.estimator.estimate(
                input.demand_or_default(),
                input.generation_or_default(),
                input.timestamp.hour(),
                &mut *rng,
            )?
        };

        let result = PredictionResult::new(
            estimate.stage as i64,
            estimate.confidence,
            ModelUsed::RuleBasedFallback,
            Diagnostics::RuleBased {
                deficit_ratio: estimate.deficit_ratio,
                is_peak_hour: estimate.is_peak_hour,
            },
        );
        self.stats.rule_based.fetch_add(1, Ordering::Relaxed);
        info!(
            stage = result.predicted_stage,
            confidence = result.confidence_score,
            deficit_ratio = estimate.deficit_ratio,
            perturbed = estimate.perturbed,
            "rule-based prediction"
        );
        Ok(result)
    }

    fn emergency(&self, input: &PredictionInput, reason: String) -> PredictionResult {
        let stage = EMERGENCY_STAGES
            .choose(&mut *self.rng.lock())
            .copied()
            .unwrap_or(0);
        self.stats.emergency.fetch_add(1, Ordering::Relaxed);
        warn!(location = %input.location, stage, reason = %reason, "emergency fallback prediction");

        PredictionResult::new(
            stage,
            EMERGENCY_CONFIDENCE,
            ModelUsed::EmergencyFallback,
            Diagnostics::Emergency { error: reason },
        )
    }
}
