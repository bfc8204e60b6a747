use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::metric::Metric;
use common::model::Reading;
use rand::Rng;

use crate::config::SensorConfig;
use crate::errors::{Error, Result};

const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// One metric value produced by a single driver read.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub metric: Metric,
    pub value: f64,
    pub unit: &'static str,
}

impl MetricValue {
    pub fn new(metric: Metric, value: f64) -> Self {
        Self {
            metric,
            value,
            unit: metric.canonical_unit(),
        }
    }
}

/// Uniform capability over physical sensor backends.
#[async_trait]
pub trait SensorDriver: Send {
    async fn read(&mut self) -> Result<Vec<MetricValue>>;
}

/// Sensor identity attached to every reading it produces.
#[derive(Debug, Clone)]
pub struct SensorMeta {
    pub key: String,
    pub name: Option<String>,
    pub model: Option<String>,
    pub location: Option<String>,
    pub interval_sec: u64,
}

impl SensorMeta {
    pub fn from_config(config: &SensorConfig) -> Self {
        Self {
            key: config.key.clone(),
            name: config.name.clone(),
            model: config.model.clone().or_else(|| Some(config.driver.clone())),
            location: config.location.clone(),
            interval_sec: config.interval_sec,
        }
    }

    pub fn reading(&self, value: &MetricValue, recorded_at: DateTime<Utc>) -> Reading {
        Reading {
            sensor_key: self.key.clone(),
            sensor_name: self.name.clone(),
            sensor_model: self.model.clone(),
            sensor_location: self.location.clone(),
            poll_interval_sec: Some(self.interval_sec as i64),
            metric: value.metric,
            value: value.value,
            unit: value.unit.to_string(),
            recorded_at,
        }
    }
}

pub fn build_driver(config: &SensorConfig) -> Result<Box<dyn SensorDriver>> {
    match config.driver.as_str() {
        "simulated" => Ok(Box::new(SimulatedDriver::new(config))),
        "ds18b20" => Ok(Box::new(Ds18b20Driver::new(config)?)),
        other => Err(Error::InvalidConfig(format!("unknown sensor type: {other}"))),
    }
}

/// Synthetic driver standing in for I2C modules (BME280-class air sensors,
/// LTR390-class UV meters, BH1750-class lux sensors) on hosts without the
/// hardware attached.
pub struct SimulatedDriver {
    metrics: Vec<Metric>,
}

impl SimulatedDriver {
    pub fn new(config: &SensorConfig) -> Self {
        let metrics = if config.metrics.is_empty() {
            Metric::ALL.to_vec()
        } else {
            config.metrics.clone()
        };
        Self { metrics }
    }
}

#[async_trait]
impl SensorDriver for SimulatedDriver {
    async fn read(&mut self) -> Result<Vec<MetricValue>> {
        let mut rng = rand::thread_rng();
        Ok(self
            .metrics
            .iter()
            .map(|&metric| {
                let value = match metric {
                    Metric::Temperature => rng.gen_range(18.0..32.0),
                    Metric::Humidity => rng.gen_range(35.0..75.0),
                    Metric::Pressure => rng.gen_range(990.0..1030.0),
                    Metric::UvIndex => rng.gen_range(0.0..8.0),
                    Metric::AmbientLight => rng.gen_range(0.0..500.0),
                    Metric::Illuminance => rng.gen_range(50.0..800.0),
                };
                MetricValue::new(metric, value)
            })
            .collect())
    }
}

/// DS18B20 1-Wire temperature probe, read through the Linux sysfs w1
/// interface.
pub struct Ds18b20Driver {
    path: PathBuf,
    reports_temperature: bool,
}

impl Ds18b20Driver {
    pub fn new(config: &SensorConfig) -> Result<Self> {
        let reports_temperature =
            config.metrics.is_empty() || config.metrics.contains(&Metric::Temperature);
        let device_id = match &config.address {
            Some(id) => id.clone(),
            None => discover_probe()?,
        };
        Ok(Self {
            path: Path::new(W1_DEVICES_DIR).join(device_id).join("w1_slave"),
            reports_temperature,
        })
    }
}

fn discover_probe() -> Result<String> {
    for entry in std::fs::read_dir(W1_DEVICES_DIR)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        // DS18B20 devices carry the 0x28 family code prefix.
        if name.starts_with("28-") {
            return Ok(name);
        }
    }
    Err(Error::InvalidConfig(format!(
        "no DS18B20 probe found under {W1_DEVICES_DIR}"
    )))
}

#[async_trait]
impl SensorDriver for Ds18b20Driver {
    async fn read(&mut self) -> Result<Vec<MetricValue>> {
        if !self.reports_temperature {
            return Ok(Vec::new());
        }
        let payload = tokio::fs::read_to_string(&self.path).await?;
        let celsius = parse_w1_payload(&payload)?;
        Ok(vec![MetricValue::new(Metric::Temperature, celsius)])
    }
}

// The kernel reports two lines: a CRC check ending in YES/NO, then the raw
// value as t=<millidegrees>.
fn parse_w1_payload(payload: &str) -> Result<f64> {
    let mut lines = payload.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| Error::Sensor("empty w1_slave payload".to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(Error::Sensor("w1_slave CRC check failed".to_string()));
    }
    let temp_line = lines
        .next()
        .ok_or_else(|| Error::Sensor("missing temperature line".to_string()))?;
    let (_, millidegrees) = temp_line
        .split_once("t=")
        .ok_or_else(|| Error::Sensor("missing t= field".to_string()))?;
    let millidegrees: f64 = millidegrees
        .trim()
        .parse()
        .map_err(|_| Error::Sensor(format!("bad temperature value: {millidegrees}")))?;
    Ok(millidegrees / 1000.0)
}
