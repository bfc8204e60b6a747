use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sensor metadata row, serialized verbatim by `GET /api/sensors`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SensorRow {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub model: Option<String>,
    pub location: Option<String>,
    pub enabled: bool,
    pub poll_interval_sec: i64,
    pub unit_preference: String,
}

/// One measurement joined with its sensor key, as returned by the range query.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MeasurementRow {
    pub sensor_key: String,
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

/// Latest measurement per sensor/metric pair, flattened for the summary query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryRow {
    pub key: String,
    pub name: String,
    pub model: Option<String>,
    pub location: Option<String>,
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRuleRow {
    pub id: i64,
    pub metric: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub channel: String,
    pub target: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct SensorsResponse {
    pub sensors: Vec<SensorRow>,
}

#[derive(Debug, Serialize)]
pub struct MeasurementsResponse {
    pub measurements: Vec<MeasurementRow>,
}

#[derive(Debug, Serialize)]
pub struct SummaryMetric {
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SummarySensor {
    pub key: String,
    pub name: String,
    pub model: Option<String>,
    pub location: Option<String>,
    pub metrics: Vec<SummaryMetric>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub generated_at: DateTime<Utc>,
    pub sensors: Vec<SummarySensor>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertRuleRow>,
}
