use chrono::{DateTime, Utc};
use common::metric::Metric;
use common::time::parse_iso8601;
use common::units;
use serde_json::Value;

use crate::errors::{Error, Result};

/// A reading that passed per-record validation. `value` is already converted
/// to the metric's canonical unit.
#[derive(Debug, Clone)]
pub struct ValidReading {
    pub sensor_key: String,
    pub sensor_name: Option<String>,
    pub sensor_model: Option<String>,
    pub sensor_location: Option<String>,
    pub poll_interval_sec: Option<i64>,
    pub metric: Metric,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl ValidReading {
    pub fn unit(&self) -> &'static str {
        self.metric.canonical_unit()
    }
}

/// An alert rule payload that passed validation.
#[derive(Debug, Clone)]
pub struct NewAlertRule {
    pub metric: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub channel: String,
    pub target: String,
    pub enabled: bool,
}

/// Validate a single ingested reading. Failures reject only this record,
/// never the whole batch.
pub fn validate_reading(raw: &Value, received_at: DateTime<Utc>) -> Result<ValidReading> {
    let record = raw
        .as_object()
        .ok_or_else(|| Error::Validation("reading must be an object".to_string()))?;

    let sensor_key = match record.get("sensor_key").and_then(Value::as_str) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => return Err(Error::Validation("sensor_key is required".to_string())),
    };

    let metric = record
        .get("metric")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("metric is required".to_string()))?;
    let metric = Metric::parse(metric)
        .ok_or_else(|| Error::Validation(format!("unknown metric: {metric}")))?;

    let value = coerce_number(record.get("value"))
        .ok_or_else(|| Error::Validation("value must be a number".to_string()))?;

    let unit = record
        .get("unit")
        .and_then(Value::as_str)
        .unwrap_or_else(|| metric.canonical_unit());
    let value = units::to_canonical(value, unit, metric)
        .ok_or_else(|| Error::Validation(format!("unsupported unit {unit} for {metric}")))?;

    let recorded_at = match record.get("recorded_at") {
        None | Some(Value::Null) => received_at,
        Some(Value::String(ts)) => parse_iso8601(ts)
            .map_err(|_| Error::Validation(format!("invalid recorded_at timestamp: {ts}")))?,
        Some(_) => {
            return Err(Error::Validation(
                "recorded_at must be an ISO 8601 string".to_string(),
            ))
        }
    };

    Ok(ValidReading {
        sensor_key,
        sensor_name: optional_string(record.get("sensor_name")),
        sensor_model: optional_string(record.get("sensor_model")),
        sensor_location: optional_string(record.get("sensor_location")),
        poll_interval_sec: record.get("poll_interval_sec").and_then(Value::as_i64),
        metric,
        value,
        recorded_at,
    })
}

/// Validate an alert rule payload.
pub fn validate_alert(payload: &Value) -> Result<NewAlertRule> {
    let record = payload
        .as_object()
        .ok_or_else(|| Error::Validation("payload must be an object".to_string()))?;

    let metric = record.get("metric").and_then(Value::as_str);
    let channel = record.get("channel").and_then(Value::as_str);
    let target = record.get("target").and_then(Value::as_str);
    let (Some(metric), Some(channel), Some(target)) = (metric, channel, target) else {
        return Err(Error::Validation(
            "metric, channel, and target are required".to_string(),
        ));
    };

    let min_value = coerce_optional_number(record.get("min_value"))?;
    let max_value = coerce_optional_number(record.get("max_value"))?;

    Ok(NewAlertRule {
        metric: metric.to_string(),
        min_value,
        max_value,
        channel: channel.to_string(),
        target: target.to_string(),
        enabled: record.get("enabled").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Default display name derived from a sensor key ("warm_hide" -> "Warm Hide").
pub fn default_sensor_name(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// JSON numbers and numeric strings are both accepted; NaN and infinities are not.
fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn coerce_optional_number(value: Option<&Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        other => coerce_number(other).map(Some).ok_or_else(|| {
            Error::Validation("min_value and max_value must be numbers".to_string())
        }),
    }
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}
