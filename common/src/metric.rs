use std::fmt;

use serde::{Deserialize, Serialize};

/// The metrics the stack understands. Every stored measurement carries the
/// canonical unit for its metric; conversion happens only at display time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    UvIndex,
    AmbientLight,
    Illuminance,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::UvIndex,
        Metric::AmbientLight,
        Metric::Illuminance,
    ];

    /// Unit measurements of this metric are stored in.
    pub fn canonical_unit(self) -> &'static str {
        match self {
            Metric::Temperature => "c",
            Metric::Humidity => "pct",
            Metric::Pressure => "hpa",
            Metric::UvIndex => "uv_index",
            Metric::AmbientLight => "als",
            Metric::Illuminance => "lux",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::UvIndex => "uv_index",
            Metric::AmbientLight => "ambient_light",
            Metric::Illuminance => "illuminance",
        }
    }

    pub fn parse(value: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
