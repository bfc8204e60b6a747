use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use common::metric::Metric;
use common::model::IngestResponse;
use common::time::parse_iso8601;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{debug, error};

use crate::db;
use crate::errors::Error;
use crate::metrics::{
    INGEST_LATENCY_SECONDS, READINGS_INGESTED_TOTAL, READINGS_RECEIVED_TOTAL,
    READINGS_REJECTED_TOTAL,
};
use crate::model::{
    AlertsResponse, MeasurementsResponse, SensorsResponse, SummaryMetric, SummaryResponse,
    SummarySensor,
};
use crate::validate;

const DEFAULT_LIMIT: usize = 1440;
const MAX_LIMIT: usize = 10000;

#[derive(Debug, Clone)]
struct AppState {
    pool: SqlitePool,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementsQuery {
    sensor_key: Option<String>,
    metric: Option<String>,
    start: Option<String>,
    end: Option<String>,
    order: Option<String>,
    limit: Option<usize>,
}

pub fn create_router(pool: SqlitePool) -> Router {
    let state = AppState { pool };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/sensors", get(get_sensors))
        .route("/api/summary", get(get_summary))
        .route(
            "/api/measurements",
            get(get_measurements).post(post_measurements),
        )
        .route("/api/alerts", get(get_alerts).post(post_alerts))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_sensors(State(state): State<AppState>) -> Result<Json<SensorsResponse>, ApiError> {
    let sensors = db::list_sensors(&state.pool).await?;
    Ok(Json(SensorsResponse { sensors }))
}

async fn get_summary(State(state): State<AppState>) -> Result<Json<SummaryResponse>, ApiError> {
    let rows = db::latest_measurements(&state.pool).await?;

    // Rows arrive ordered by (name, key, metric), so each sensor's metrics
    // are contiguous.
    let mut sensors: Vec<SummarySensor> = Vec::new();
    for row in rows {
        let metric = SummaryMetric {
            metric: row.metric,
            value: row.value,
            unit: row.unit,
            recorded_at: row.recorded_at,
        };
        match sensors.last_mut() {
            Some(sensor) if sensor.key == row.key => sensor.metrics.push(metric),
            _ => sensors.push(SummarySensor {
                key: row.key,
                name: row.name,
                model: row.model,
                location: row.location,
                metrics: vec![metric],
            }),
        }
    }

    Ok(Json(SummaryResponse {
        generated_at: Utc::now(),
        sensors,
    }))
}

async fn get_measurements(
    State(state): State<AppState>,
    Query(params): Query<MeasurementsQuery>,
) -> Result<Json<MeasurementsResponse>, ApiError> {
    let (Some(sensor_key), Some(metric)) = (params.sensor_key, params.metric) else {
        return Err(ApiError::BadRequest(
            "sensor_key and metric are required".to_string(),
        ));
    };
    let metric = Metric::parse(&metric)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown metric: {metric}")))?;

    let start = parse_bound(params.start.as_deref(), "start")?;
    let end = parse_bound(params.end.as_deref(), "end")?;
    let descending = params.order.as_deref() == Some("desc");
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let measurements =
        db::query_measurements(&state.pool, &sensor_key, metric, start, end, descending, limit)
            .await?;
    Ok(Json(MeasurementsResponse { measurements }))
}

async fn post_measurements(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    let readings = payload.get("readings").and_then(Value::as_array);
    let Some(readings) = readings.filter(|readings| !readings.is_empty()) else {
        return Err(ApiError::BadRequest(
            "readings must be a non-empty list".to_string(),
        ));
    };

    READINGS_RECEIVED_TOTAL.inc_by(readings.len() as f64);
    let timer = INGEST_LATENCY_SECONDS.start_timer();
    let received_at = Utc::now();

    let mut ingested = 0usize;
    let mut tx = state.pool.begin().await?;
    for raw in readings {
        // Per-record rejection: one bad reading never fails the batch.
        match validate::validate_reading(raw, received_at) {
            Ok(reading) => {
                let sensor_id = db::get_or_create_sensor(&mut tx, &reading).await?;
                db::insert_measurement(&mut tx, sensor_id, &reading).await?;
                ingested += 1;
            }
            Err(err) => {
                READINGS_REJECTED_TOTAL.inc();
                debug!("Rejected reading: {}", err);
            }
        }
    }
    tx.commit().await?;

    READINGS_INGESTED_TOTAL.inc_by(ingested as f64);
    timer.observe_duration();

    Ok(Json(IngestResponse { ingested }))
}

async fn get_alerts(State(state): State<AppState>) -> Result<Json<AlertsResponse>, ApiError> {
    let alerts = db::list_alert_rules(&state.pool).await?;
    Ok(Json(AlertsResponse { alerts }))
}

async fn post_alerts(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let rule = validate::validate_alert(&payload).map_err(bad_request)?;
    db::insert_alert_rule(&state.pool, &rule).await?;
    Ok(Json(json!({ "created": true })))
}

fn parse_bound(value: Option<&str>, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => parse_iso8601(raw)
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {name} timestamp: {raw}"))),
    }
}

fn bad_request(err: Error) -> ApiError {
    match err {
        Error::Validation(message) => ApiError::BadRequest(message),
        other => ApiError::Internal(other.into()),
    }
}

enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(err) => {
                error!("API error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {}", err),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
