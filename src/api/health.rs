use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{cache::CacheStatus, controller::AppState, ml::ModelStatus};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub cache: CacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_error: Option<String>,
    pub ml_models: ModelStatus,
}

/// GET / - service banner
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Load Shedding Prediction API",
        "status": "active",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

/// GET /health
///
/// A disconnected cache or an empty registry is reported but never fails the
/// check: the rule-based fallback serves predictions without either.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.cache.health();
    tracing::debug!(cache = %cache.status, "health check completed");

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        cache: cache.status,
        cache_error: cache.error,
        ml_models: state.resolver.registry().model_status(),
    })
}

/// GET /health/live - process liveness only
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}
