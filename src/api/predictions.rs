//! Prediction endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::error::ApiError,
    auth::AuthBearer,
    controller::AppState,
    domain::{ModelUsed, PredictionInput},
    repo::{
        historical::MAX_HISTORICAL_LIMIT, HistoricalQuery, HistoricalRecord, PredictionRecord,
    },
};

/// Body of a prediction request; absent signals are filled from the data sources
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PredictionRequest {
    #[validate(length(min = 1, max = 100))]
    pub location: String,
    /// RFC 3339; a timestamp without offset is read as UTC
    #[serde(alias = "date_time", deserialize_with = "deserialize_timestamp")]
    pub datetime: DateTime<FixedOffset>,
    #[validate(range(min = -50.0, max = 60.0))]
    pub temperature: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub humidity: Option<f64>,
    #[validate(range(min = 0.0, max = 200.0))]
    pub wind_speed: Option<f64>,
    #[validate(range(min = 0.0))]
    pub demand_forecast: Option<f64>,
    #[validate(range(min = 0.0))]
    pub generation_capacity: Option<f64>,
    #[validate(range(min = 0.0, max = 8.0))]
    pub historical_avg: Option<f64>,
}

impl PredictionRequest {
    pub fn into_input(self) -> Result<PredictionInput, ApiError> {
        let location = self.location.trim();
        if location.is_empty() {
            return Err(ApiError::ValidationError("location must not be blank".to_string()));
        }
        Ok(PredictionInput {
            location: location.to_string(),
            timestamp: self.datetime,
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            demand_forecast: self.demand_forecast,
            generation_capacity: self.generation_capacity,
            historical_avg: self.historical_avg,
        })
    }

    fn validated(self) -> Result<PredictionInput, ApiError> {
        self.validate()?;
        self.into_input()
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid datetime: {raw}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub id: Uuid,
    pub predicted_stage: u8,
    pub confidence_score: f64,
    pub model_used: ModelUsed,
    pub location: String,
    pub datetime: DateTime<FixedOffset>,
    pub created_at: DateTime<Utc>,
}

impl From<PredictionRecord> for PredictionResponse {
    fn from(r: PredictionRecord) -> Self {
        Self {
            id: r.id,
            predicted_stage: r.predicted_stage,
            confidence_score: r.confidence_score,
            model_used: r.model_used,
            location: r.location,
            datetime: r.timestamp,
            created_at: r.created_at,
        }
    }
}

/// POST /api/v1/predictions/predict
pub async fn create_prediction(
    State(st): State<AppState>,
    AuthBearer(client): AuthBearer,
    Json(req): Json<PredictionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.validated()?;
    let record = st.predict(&client, input).await;
    info!(
        id = %record.id,
        client = %client,
        location = %record.location,
        stage = record.predicted_stage,
        model = %record.model_used,
        "prediction created"
    );
    Ok((StatusCode::CREATED, Json(PredictionResponse::from(record))))
}

/// POST /api/v1/predictions/batch
///
/// Items that fail validation are skipped; the rest are stored together.
pub async fn create_batch_predictions(
    State(st): State<AppState>,
    AuthBearer(client): AuthBearer,
    Json(reqs): Json<Vec<PredictionRequest>>,
) -> Result<Json<Vec<PredictionResponse>>, ApiError> {
    let max = st.cfg.predictions.max_batch;
    if reqs.len() > max {
        return Err(ApiError::BadRequest(format!(
            "Maximum {max} predictions allowed per batch"
        )));
    }

    let requested = reqs.len();
    let inputs: Vec<PredictionInput> = reqs
        .into_iter()
        .enumerate()
        .filter_map(|(idx, req)| match req.validated() {
            Ok(input) => Some(input),
            Err(e) => {
                warn!(index = idx, error = %e, "batch item skipped");
                None
            }
        })
        .collect();

    let records = st.predict_batch(&client, inputs).await;
    info!(client = %client, requested, created = records.len(), "batch predictions created");
    Ok(Json(records.into_iter().map(PredictionResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /api/v1/predictions
pub async fn list_predictions(
    State(st): State<AppState>,
    AuthBearer(client): AuthBearer,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PredictionResponse>>, ApiError> {
    let cfg = &st.cfg.predictions;
    let limit = params.limit.unwrap_or(cfg.default_page_size);
    if limit > cfg.max_page_size {
        return Err(ApiError::ValidationError(format!(
            "limit must be at most {}",
            cfg.max_page_size
        )));
    }

    let records = st
        .repos
        .predictions
        .list(&client, limit, params.offset.unwrap_or(0))
        .await;
    Ok(Json(records.into_iter().map(PredictionResponse::from).collect()))
}

/// GET /api/v1/predictions/:id
pub async fn get_prediction(
    State(st): State<AppState>,
    AuthBearer(client): AuthBearer,
    Path(id): Path<Uuid>,
) -> Result<Json<PredictionResponse>, ApiError> {
    st.repos
        .predictions
        .get(id, &client)
        .await
        .map(|r| Json(r.into()))
        .ok_or_else(|| ApiError::NotFound("Prediction not found".to_string()))
}

/// DELETE /api/v1/predictions/:id
pub async fn delete_prediction(
    State(st): State<AppState>,
    AuthBearer(client): AuthBearer,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if st.repos.predictions.delete(id, &client).await {
        info!(%id, client = %client, "prediction deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Prediction not found".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoricalParams {
    pub location: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// GET /api/v1/predictions/historical/data
pub async fn get_historical_data(
    State(st): State<AppState>,
    AuthBearer(_): AuthBearer,
    Query(params): Query<HistoricalParams>,
) -> Result<Json<Vec<HistoricalRecord>>, ApiError> {
    if params.limit.is_some_and(|l| l > MAX_HISTORICAL_LIMIT) {
        return Err(ApiError::ValidationError(format!(
            "limit must be at most {MAX_HISTORICAL_LIMIT}"
        )));
    }
    if let (Some(start), Some(end)) = (params.start_date, params.end_date) {
        if start > end {
            return Err(ApiError::ValidationError(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }

    let query = HistoricalQuery {
        location: params.location.filter(|l| !l.trim().is_empty()),
        start: params.start_date,
        end: params.end_date,
        limit: params.limit,
    };
    Ok(Json(st.repos.historical.query(&query).await))
}
