use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{cache::CacheStatus, controller::AppState, predictor::ResolverStatsSnapshot};

#[derive(Debug, Serialize)]
pub struct ApiStatus {
    pub api_version: &'static str,
    pub features: FeatureFlags,
    pub endpoints: Endpoints,
    pub predictions: ResolverStatsSnapshot,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FeatureFlags {
    pub authentication: bool,
    pub ml_predictions: bool,
    pub caching: bool,
    pub external_apis: bool,
    pub batch_predictions: bool,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub predictions: &'static str,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<ApiStatus> {
    let registry = state.resolver.registry();
    Json(ApiStatus {
        api_version: env!("CARGO_PKG_VERSION"),
        features: FeatureFlags {
            authentication: !state.cfg.auth.clients.is_empty(),
            ml_predictions: !registry.is_empty(),
            caching: state.cache.health().status == CacheStatus::Healthy,
            external_apis: false,
            batch_predictions: state.cfg.predictions.max_batch > 1,
        },
        endpoints: Endpoints {
            health: "/health",
            predictions: "/api/v1/predictions",
        },
        predictions: state.resolver.stats(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
