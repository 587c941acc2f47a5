use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use loadshedding_predictor::{
    api,
    config::{ApiClient, Config},
    controller::AppState,
    ml::ModelRegistry,
    repo::HistoricalRecord,
};

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.auth.clients = vec![
        ApiClient { name: "alice".into(), token: ALICE.into() },
        ApiClient { name: "bob".into(), token: BOB.into() },
    ];
    cfg.predictions.random_seed = Some(11);
    cfg.predictions.perturbation_probability = 0.0;
    cfg.sources.random_seed = Some(12);
    cfg
}

fn app_with(registry: ModelRegistry) -> (Router, AppState) {
    let state = AppState::with_registry(config(), registry).unwrap();
    (api::router(state.clone()), state)
}

fn app() -> (Router, AppState) {
    app_with(ModelRegistry::empty())
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn off_peak_body() -> Value {
    json!({
        "location": "Johannesburg",
        "datetime": "2024-06-12T02:00:00+02:00",
        "demand_forecast": 31000.0,
        "generation_capacity": 28000.0
    })
}

#[tokio::test]
async fn public_endpoints_need_no_token() {
    let (app, _) = app();

    let (status, body) = send(&app, request(Method::GET, "/", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"], "healthy");
    assert_eq!(body["ml_models"]["models_loaded"], 0);

    let (status, _) = send(&app, request(Method::GET, "/health/live", None, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request(Method::GET, "/api/v1/status", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"]["authentication"], true);
    assert_eq!(body["features"]["ml_predictions"], false);
    assert_eq!(body["features"]["batch_predictions"], true);
}

#[tokio::test]
async fn health_reports_disabled_cache_as_healthy() {
    let mut cfg = config();
    cfg.cache.enabled = false;
    let state = AppState::with_registry(cfg, ModelRegistry::empty()).unwrap();
    let app = api::router(state);

    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"], "disconnected");
}

#[tokio::test]
async fn predictions_require_a_known_token() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/predict", None, Some(off_peak_body())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/predict", Some("wrong"), Some(off_peak_body())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn predict_without_models_uses_rule_based_fallback() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/predict", Some(ALICE), Some(off_peak_body())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["model_used"], "rule_based_fallback");
    assert_eq!(body["predicted_stage"], 3);
    assert_eq!(body["confidence_score"], 0.65);
    assert_eq!(body["location"], "Johannesburg");
    assert!(body["id"].is_string());
}

#[tokio::test]
async fn repeated_predictions_are_served_from_cache() {
    let (app, state) = app();
    let body = json!({
        "location": "Cape Town",
        "datetime": "2024-06-12T19:00:00+02:00",
        "temperature": 18.0,
        "humidity": 70.0,
        "wind_speed": 12.0,
        "demand_forecast": 33000.0,
        "generation_capacity": 27000.0,
        "historical_avg": 2.0
    });

    let (_, first) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/predict", Some(ALICE), Some(body.clone())),
    )
    .await;
    let (_, second) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/predict", Some(BOB), Some(body)),
    )
    .await;

    assert_eq!(first["predicted_stage"], second["predicted_stage"]);
    assert_eq!(first["model_used"], second["model_used"]);
    assert_ne!(first["id"], second["id"], "each request is stored separately");
    assert_eq!(state.resolver.stats().cache_hits, 1);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/predictions/predict",
            Some(ALICE),
            Some(json!({ "location": "Durban", "datetime": "2024-06-12T02:00:00Z", "humidity": 150.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/predictions/predict",
            Some(ALICE),
            Some(json!({ "location": "Durban" })),
        ),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn list_get_and_delete_are_scoped_to_the_caller() {
    let (app, _) = app();

    let mut ids = Vec::new();
    for hour in 0..3 {
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/api/v1/predictions/predict",
                Some(ALICE),
                Some(json!({
                    "location": format!("Site {hour}"),
                    "datetime": format!("2024-06-12T0{hour}:00:00+02:00")
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let (status, body) =
        send(&app, request(Method::GET, "/api/v1/predictions?limit=2", Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    let locations: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["location"].as_str().unwrap())
        .collect();
    assert_eq!(locations, vec!["Site 2", "Site 1"]);

    let (_, body) =
        send(&app, request(Method::GET, "/api/v1/predictions?offset=2", Some(ALICE), None)).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, request(Method::GET, "/api/v1/predictions", Some(BOB), None)).await;
    assert!(body.as_array().unwrap().is_empty());

    let (status, _) =
        send(&app, request(Method::GET, "/api/v1/predictions?limit=101", Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/predictions/{}", ids[0]);
    let (status, body) = send(&app, request(Method::GET, &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["location"], "Site 0");

    let (status, _) = send(&app, request(Method::GET, &uri, Some(BOB), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request(Method::DELETE, &uri, Some(BOB), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request(Method::DELETE, &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, request(Method::GET, &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batch_is_capped_and_skips_invalid_items() {
    let (app, _) = app();

    let too_many: Vec<Value> = (0..11).map(|_| off_peak_body()).collect();
    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/batch", Some(ALICE), Some(json!(too_many))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("10"));

    let mixed = json!([
        off_peak_body(),
        { "location": "Durban", "datetime": "2024-06-12T18:00:00+02:00", "humidity": -4.0 },
        { "location": "Kimberley", "datetime": "2024-06-12T18:00:00+02:00" }
    ]);
    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/batch", Some(ALICE), Some(mixed)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created = body.as_array().unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[1]["location"], "Kimberley");
}

#[tokio::test]
async fn historical_data_filters() {
    let (app, state) = app();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    state
        .repos
        .historical
        .extend((0..10).map(|h| {
            let loc = if h < 6 { "Cape Town" } else { "Pretoria" };
            HistoricalRecord::new(loc, t0 + chrono::Duration::hours(h), 2)
        }))
        .await;

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            "/api/v1/predictions/historical/data?location=CAPE&limit=4",
            Some(ALICE),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r["location"] == "Cape Town"));

    let (status, _) = send(
        &app,
        request(Method::GET, "/api/v1/predictions/historical/data?limit=1001", Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(Method::GET, "/api/v1/predictions/historical/data", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn loaded_model_takes_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = json!({
        "kind": "tree_ensemble",
        "classes": [0, 5],
        "trees": [{
            "nodes": [
                { "type": "split", "feature": 3, "threshold": 30000.0, "left": 1, "right": 2 },
                { "type": "leaf", "distribution": [4.0, 1.0] },
                { "type": "leaf", "distribution": [1.0, 4.0] }
            ]
        }]
    });
    std::fs::write(dir.path().join("xgboost_model.json"), artifact.to_string()).unwrap();

    let (app, _) = app_with(ModelRegistry::load(dir.path()));

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/predictions/predict", Some(ALICE), Some(off_peak_body())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["model_used"], "xgboost");
    assert_eq!(body["predicted_stage"], 5);
    assert_eq!(body["confidence_score"], 0.8);

    let (_, health) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(health["ml_models"]["models_loaded"], 1);
    assert_eq!(health["ml_models"]["model_details"]["xgboost"]["type"], "TreeEnsemble");
}
