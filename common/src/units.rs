//! Unit conversion shared by the agent, the server, and the dashboard API.
//!
//! Only temperature has a display-time conversion (Celsius/Fahrenheit); every
//! other unit passes through unchanged regardless of the requested preference.

use crate::metric::Metric;

/// Display preference for temperature values. Storage is always Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPreference {
    Celsius,
    Fahrenheit,
}

impl UnitPreference {
    pub fn parse(value: &str) -> Option<UnitPreference> {
        match value {
            "c" => Some(UnitPreference::Celsius),
            "f" => Some(UnitPreference::Fahrenheit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitPreference::Celsius => "c",
            UnitPreference::Fahrenheit => "f",
        }
    }
}

pub fn celsius_to_fahrenheit(value: f64) -> f64 {
    value * 1.8 + 32.0
}

pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) / 1.8
}

/// Convert a value to the requested display preference. Non-temperature units
/// are returned unchanged.
pub fn convert(value: f64, unit: &str, preference: UnitPreference) -> (f64, String) {
    match (unit, preference) {
        ("c", UnitPreference::Fahrenheit) => (celsius_to_fahrenheit(value), "f".to_string()),
        ("f", UnitPreference::Celsius) => (fahrenheit_to_celsius(value), "c".to_string()),
        _ => (value, unit.to_string()),
    }
}

/// Convert a reading to its metric's canonical unit for storage. Returns
/// `None` when the unit is not one the metric accepts.
pub fn to_canonical(value: f64, unit: &str, metric: Metric) -> Option<f64> {
    if unit == metric.canonical_unit() {
        return Some(value);
    }
    match (metric, unit) {
        (Metric::Temperature, "f") => Some(fahrenheit_to_celsius(value)),
        _ => None,
    }
}
