//! Cache keys for prediction results

use itertools::Itertools;
use sha2::{Digest, Sha256};

use crate::domain::PredictionInput;

pub const PREDICTION_KEY_PREFIX: &str = "prediction:";

fn encode_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:?}"),
        None => "null".to_string(),
    }
}

/// Canonical text form of an input: fields sorted by name, one per line
///
/// The location is length-prefixed so it cannot smuggle a separator.
pub fn canonical_encoding(input: &PredictionInput) -> String {
    let fields = [
        ("timestamp", input.timestamp.to_rfc3339()),
        ("location", format!("{}:{}", input.location.len(), input.location)),
        ("temperature", encode_opt(input.temperature)),
        ("humidity", encode_opt(input.humidity)),
        ("wind_speed", encode_opt(input.wind_speed)),
        ("demand_forecast", encode_opt(input.demand_forecast)),
        ("generation_capacity", encode_opt(input.generation_capacity)),
        ("historical_avg", encode_opt(input.historical_avg)),
    ];

    fields
        .iter()
        .sorted_by_key(|(name, _)| *name)
        .map(|(name, value)| format!("{name}={value}"))
        .join("\n")
}

/// `prediction:<sha256 hex>` over the canonical encoding
pub fn prediction_cache_key(input: &PredictionInput) -> String {
    let digest = Sha256::digest(canonical_encoding(input).as_bytes());
    format!("{PREDICTION_KEY_PREFIX}{}", hex::encode(digest))
}
