use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;

use server::db::MIGRATOR;
use server::rest::create_router;

// A single connection keeps every query on the same in-memory database.
async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    MIGRATOR.run(&pool).await.expect("failed to run migrations");
    pool
}

async fn test_app() -> Router {
    create_router(test_pool().await)
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(payload) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn reading(sensor_key: &str, metric: &str, value: f64, unit: &str, recorded_at: &str) -> Value {
    json!({
        "sensor_key": sensor_key,
        "metric": metric,
        "value": value,
        "unit": unit,
        "recorded_at": recorded_at,
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = request(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ingest_and_fetch() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 26.4, "c", "2024-01-01T11:58:00Z"),
            reading("ambient_bme280", "temperature", 27.1, "c", "2024-01-01T11:59:00Z"),
        ]
    });

    let (status, body) = request(&app, "POST", "/api/measurements", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingested"], 2);

    let (status, body) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature&order=asc",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let measurements = body["measurements"].as_array().unwrap();
    assert_eq!(measurements.len(), 2);
    assert_eq!(measurements[0]["value"], 26.4);
    assert_eq!(measurements[1]["value"], 27.1);
    assert_eq!(measurements[0]["sensor_key"], "ambient_bme280");
    assert_eq!(measurements[0]["unit"], "c");
}

#[tokio::test]
async fn test_mixed_batch_counts_only_valid_records() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 26.4, "c", "2024-01-01T12:00:00Z"),
            reading("ambient_bme280", "humidity", 55.0, "pct", "2024-01-01T12:00:00Z"),
            { "metric": "temperature", "value": 20.0, "unit": "c" },
            { "sensor_key": "ambient_bme280", "metric": "temperature", "value": "not-a-number" },
            { "sensor_key": "ambient_bme280", "metric": "temperature", "value": 20.0,
              "recorded_at": "yesterday" },
            { "sensor_key": "ambient_bme280", "metric": "co2", "value": 400.0 },
        ]
    });

    let (status, body) = request(&app, "POST", "/api/measurements", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingested"], 2);

    // Only the two valid rows were persisted.
    let (_, temps) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature",
        None,
    )
    .await;
    assert_eq!(temps["measurements"].as_array().unwrap().len(), 1);
    let (_, humidity) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=humidity",
        None,
    )
    .await;
    assert_eq!(humidity["measurements"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_measurements_date_range_filters() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 24.5, "c", "2024-01-01T09:00:00Z"),
            reading("ambient_bme280", "temperature", 25.0, "c", "2024-01-01T10:00:00Z"),
            reading("ambient_bme280", "temperature", 26.0, "c", "2024-01-01T11:00:00Z"),
        ]
    });
    let (status, _) = request(&app, "POST", "/api/measurements", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature\
         &start=2024-01-01T09:30:00Z&end=2024-01-01T10:30:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let measurements = body["measurements"].as_array().unwrap();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0]["value"], 25.0);
}

#[tokio::test]
async fn test_measurements_desc_order_and_limit() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 22.0, "c", "2024-01-01T09:00:00Z"),
            reading("ambient_bme280", "temperature", 23.0, "c", "2024-01-01T10:00:00Z"),
            reading("ambient_bme280", "temperature", 24.0, "c", "2024-01-01T11:00:00Z"),
        ]
    });
    request(&app, "POST", "/api/measurements", Some(payload)).await;

    let (status, body) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature&order=desc&limit=2",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let measurements = body["measurements"].as_array().unwrap();
    assert_eq!(measurements.len(), 2);
    assert_eq!(measurements[0]["value"], 24.0);
    assert_eq!(measurements[1]["value"], 23.0);
}

#[tokio::test]
async fn test_measurements_invalid_timestamp() {
    let app = test_app().await;
    let (status, body) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature&start=not-a-timestamp",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("start"));
}

#[tokio::test]
async fn test_measurements_require_filters() {
    let app = test_app().await;
    let (status, body) = request(&app, "GET", "/api/measurements", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "sensor_key and metric are required");
}

#[tokio::test]
async fn test_ingest_rejects_empty_readings() {
    let app = test_app().await;
    let (status, body) = request(&app, "POST", "/api/measurements", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "readings must be a non-empty list");

    let (status, _) = request(
        &app,
        "POST",
        "/api/measurements",
        Some(json!({ "readings": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_summary_returns_latest_per_metric() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 24.0, "c", "2024-01-01T11:50:00Z"),
            reading("ambient_bme280", "temperature", 25.5, "c", "2024-01-01T11:55:00Z"),
            reading("ambient_bme280", "humidity", 55.0, "pct", "2024-01-01T11:53:00Z"),
        ]
    });
    request(&app, "POST", "/api/measurements", Some(payload)).await;

    let (status, body) = request(&app, "GET", "/api/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["generated_at"].is_string());

    let sensors = body["sensors"].as_array().unwrap();
    let sensor = sensors
        .iter()
        .find(|sensor| sensor["key"] == "ambient_bme280")
        .unwrap();
    let metrics = sensor["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 2);

    let temperature = metrics.iter().find(|m| m["metric"] == "temperature").unwrap();
    assert_eq!(temperature["value"], 25.5);
    let humidity = metrics.iter().find(|m| m["metric"] == "humidity").unwrap();
    assert_eq!(humidity["value"], 55.0);
}

#[tokio::test]
async fn test_sensor_auto_registration_first_seen_wins() {
    let app = test_app().await;
    let payload = json!({
        "readings": [{
            "sensor_key": "new_sensor",
            "sensor_name": "Custom Sensor",
            "sensor_model": "Custom",
            "sensor_location": "Shelf",
            "metric": "temperature",
            "value": 21.5,
            "unit": "c",
        }]
    });
    let (status, body) = request(&app, "POST", "/api/measurements", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingested"], 1);

    // A later ingest with different metadata must not overwrite the record.
    let payload = json!({
        "readings": [{
            "sensor_key": "new_sensor",
            "sensor_name": "Renamed Sensor",
            "metric": "temperature",
            "value": 21.6,
            "unit": "c",
        }]
    });
    request(&app, "POST", "/api/measurements", Some(payload)).await;

    let (status, body) = request(&app, "GET", "/api/sensors", None).await;
    assert_eq!(status, StatusCode::OK);
    let sensors = body["sensors"].as_array().unwrap();
    let sensor = sensors.iter().find(|s| s["key"] == "new_sensor").unwrap();
    assert_eq!(sensor["name"], "Custom Sensor");
    assert_eq!(sensor["model"], "Custom");
    assert_eq!(sensor["location"], "Shelf");
    assert_eq!(sensor["enabled"], true);
}

#[tokio::test]
async fn test_sensor_name_defaults_to_title_cased_key() {
    let app = test_app().await;
    let payload = json!({
        "readings": [{
            "sensor_key": "warm_hide_probe",
            "metric": "temperature",
            "value": 30.2,
            "unit": "c",
        }]
    });
    request(&app, "POST", "/api/measurements", Some(payload)).await;

    let (_, body) = request(&app, "GET", "/api/sensors", None).await;
    let sensors = body["sensors"].as_array().unwrap();
    let sensor = sensors.iter().find(|s| s["key"] == "warm_hide_probe").unwrap();
    assert_eq!(sensor["name"], "Warm Hide Probe");
}

#[tokio::test]
async fn test_fahrenheit_input_stored_as_celsius() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 79.52, "f", "2024-01-01T12:00:00Z"),
        ]
    });
    let (status, body) = request(&app, "POST", "/api/measurements", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingested"], 1);

    let (_, body) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature",
        None,
    )
    .await;
    let measurements = body["measurements"].as_array().unwrap();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0]["unit"], "c");
    let value = measurements[0]["value"].as_f64().unwrap();
    assert!((value - 26.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_reposting_creates_duplicate_rows() {
    let app = test_app().await;
    let payload = json!({
        "readings": [
            reading("ambient_bme280", "temperature", 26.4, "c", "2024-01-01T12:00:00Z"),
        ]
    });

    // Ingestion is not idempotent: at-least-once redelivery duplicates rows.
    request(&app, "POST", "/api/measurements", Some(payload.clone())).await;
    request(&app, "POST", "/api/measurements", Some(payload)).await;

    let (_, body) = request(
        &app,
        "GET",
        "/api/measurements?sensor_key=ambient_bme280&metric=temperature",
        None,
    )
    .await;
    assert_eq!(body["measurements"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_alert_create_and_list() {
    let app = test_app().await;
    let payload = json!({
        "metric": "temperature",
        "min_value": "22",
        "max_value": "30",
        "channel": "webhook",
        "target": "https://example.com/alert",
    });
    let (status, body) = request(&app, "POST", "/api/alerts", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], true);

    let (status, body) = request(&app, "GET", "/api/alerts", None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["alerts"].as_array().unwrap();
    let alert = alerts.iter().find(|a| a["metric"] == "temperature").unwrap();
    assert_eq!(alert["min_value"], 22.0);
    assert_eq!(alert["max_value"], 30.0);
    assert_eq!(alert["channel"], "webhook");
}

#[tokio::test]
async fn test_alert_validation_errors() {
    let app = test_app().await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/alerts",
        Some(json!({ "metric": "temperature" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("metric"));

    let (status, body) = request(
        &app,
        "POST",
        "/api/alerts",
        Some(json!({
            "metric": "temperature",
            "min_value": "bad",
            "channel": "email",
            "target": "alerts@example.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("min_value"));
}
