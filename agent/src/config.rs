use std::collections::HashSet;
use std::path::Path;

use common::metric::Metric;
use serde::Deserialize;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Full URL of the ingestion endpoint.
    pub url: String,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_flush_interval_sec")]
    pub flush_interval_sec: u64,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_shutdown_grace_sec")]
    pub shutdown_grace_sec: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_sec: default_flush_interval_sec(),
            buffer_capacity: default_buffer_capacity(),
            shutdown_grace_sec: default_shutdown_grace_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub key: String,
    #[serde(rename = "type")]
    pub driver: String,
    pub name: Option<String>,
    pub model: Option<String>,
    pub location: Option<String>,
    /// Driver-specific address (e.g. a 1-Wire device id).
    pub address: Option<String>,
    #[serde(default = "default_interval_sec")]
    pub interval_sec: u64,
    /// Metrics to report; empty means everything the driver supports.
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AgentConfig {
    /// Load and validate the TOML config file, with `MONITOR__`-prefixed
    /// environment variables overriding file values.
    pub fn load(path: &Path) -> Result<AgentConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("MONITOR").separator("__"))
            .build()?;
        let parsed: AgentConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.api.url.is_empty() {
            return Err(Error::InvalidConfig("api.url is required".to_string()));
        }
        if self.batch.buffer_capacity == 0 {
            return Err(Error::InvalidConfig(
                "batch.buffer_capacity must be positive".to_string(),
            ));
        }
        if self.batch.flush_interval_sec == 0 {
            return Err(Error::InvalidConfig(
                "batch.flush_interval_sec must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if sensor.key.is_empty() {
                return Err(Error::InvalidConfig("sensor key is required".to_string()));
            }
            if !seen.insert(sensor.key.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate sensor key: {}",
                    sensor.key
                )));
            }
            if sensor.interval_sec == 0 {
                return Err(Error::InvalidConfig(format!(
                    "sensor {}: interval_sec must be positive",
                    sensor.key
                )));
            }
        }
        Ok(())
    }
}

fn default_timeout_sec() -> u64 {
    10
}

fn default_flush_interval_sec() -> u64 {
    10
}

fn default_buffer_capacity() -> usize {
    4096
}

fn default_shutdown_grace_sec() -> u64 {
    5
}

fn default_interval_sec() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}
