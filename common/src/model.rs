use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metric::Metric;

/// One metric value captured from one sensor, as shipped to the ingestion
/// endpoint. The optional sensor fields let the server auto-register sensors
/// it has not seen before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_sec: Option<i64>,
    pub metric: Metric,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

/// Body of `POST /api/measurements`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub readings: Vec<Reading>,
}

/// Response of `POST /api/measurements`. `ingested` may be less than the
/// number of readings sent when some records failed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ingested: usize,
}
