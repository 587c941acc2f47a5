use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    api::{predictions, status},
    controller::AppState,
};

/// Routes mounted under `/api/v1`; prediction routes authenticate per handler
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/predictions", get(predictions::list_predictions))
        .route("/predictions/predict", post(predictions::create_prediction))
        .route("/predictions/batch", post(predictions::create_batch_predictions))
        .route("/predictions/historical/data", get(predictions::get_historical_data))
        .route(
            "/predictions/:id",
            get(predictions::get_prediction).delete(predictions::delete_prediction),
        )
}
