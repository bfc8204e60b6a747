use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::metric::Metric;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use tracing::info;

use crate::errors::Result;
use crate::metrics::SENSORS_REGISTERED_TOTAL;
use crate::model::{AlertRuleRow, MeasurementRow, SensorRow, SummaryRow};
use crate::validate::{default_sensor_name, NewAlertRule, ValidReading};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn make_pool(database_url: &str) -> Result<SqlitePool> {
    ensure_parent_dir(database_url)?;

    info!("Connecting to database...");
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    MIGRATOR.run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

// The SQLite file may live in a directory that does not exist yet.
fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Find a sensor by key, registering it if unseen. First-seen metadata wins;
/// subsequent ingests never overwrite the stored row.
pub async fn get_or_create_sensor(
    conn: &mut SqliteConnection,
    reading: &ValidReading,
) -> Result<i64> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM sensors WHERE key = ?")
        .bind(&reading.sensor_key)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let name = reading
        .sensor_name
        .clone()
        .unwrap_or_else(|| default_sensor_name(&reading.sensor_key));
    let now = Utc::now();
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sensors (key, name, model, location, poll_interval_sec, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&reading.sensor_key)
    .bind(&name)
    .bind(&reading.sensor_model)
    .bind(&reading.sensor_location)
    .bind(reading.poll_interval_sec.unwrap_or(60))
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    SENSORS_REGISTERED_TOTAL.inc();
    info!("Auto-registered sensor {} ({})", reading.sensor_key, name);
    Ok(id)
}

pub async fn insert_measurement(
    conn: &mut SqliteConnection,
    sensor_id: i64,
    reading: &ValidReading,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO measurements (sensor_id, metric, value, unit, recorded_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(sensor_id)
    .bind(reading.metric.as_str())
    .bind(reading.value)
    .bind(reading.unit())
    .bind(reading.recorded_at)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_sensors(pool: &SqlitePool) -> Result<Vec<SensorRow>> {
    let sensors = sqlx::query_as::<_, SensorRow>(
        "SELECT id, key, name, model, location, enabled, poll_interval_sec, unit_preference \
         FROM sensors ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(sensors)
}

pub async fn query_measurements(
    pool: &SqlitePool,
    sensor_key: &str,
    metric: Metric,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    descending: bool,
    limit: usize,
) -> Result<Vec<MeasurementRow>> {
    let mut sql = String::from(
        "SELECT s.key AS sensor_key, m.metric, m.value, m.unit, m.recorded_at \
         FROM measurements m \
         JOIN sensors s ON s.id = m.sensor_id \
         WHERE s.key = ? AND m.metric = ?",
    );
    if start.is_some() {
        sql.push_str(" AND m.recorded_at >= ?");
    }
    if end.is_some() {
        sql.push_str(" AND m.recorded_at <= ?");
    }
    sql.push_str(if descending {
        " ORDER BY m.recorded_at DESC"
    } else {
        " ORDER BY m.recorded_at ASC"
    });
    sql.push_str(" LIMIT ?");

    let mut query = sqlx::query_as::<_, MeasurementRow>(&sql)
        .bind(sensor_key)
        .bind(metric.as_str());
    if let Some(start) = start {
        query = query.bind(start);
    }
    if let Some(end) = end {
        query = query.bind(end);
    }
    let measurements = query.bind(limit as i64).fetch_all(pool).await?;
    Ok(measurements)
}

/// Latest measurement per (sensor, metric) pair, for the dashboard overview.
pub async fn latest_measurements(pool: &SqlitePool) -> Result<Vec<SummaryRow>> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        "SELECT key, name, model, location, metric, value, unit, recorded_at FROM ( \
             SELECT s.key, s.name, s.model, s.location, \
                    m.metric, m.value, m.unit, m.recorded_at, \
                    ROW_NUMBER() OVER ( \
                        PARTITION BY m.sensor_id, m.metric \
                        ORDER BY m.recorded_at DESC, m.id DESC \
                    ) AS row_num \
             FROM measurements m \
             JOIN sensors s ON s.id = m.sensor_id \
         ) WHERE row_num = 1 \
         ORDER BY name, key, metric",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_alert_rules(pool: &SqlitePool) -> Result<Vec<AlertRuleRow>> {
    let alerts = sqlx::query_as::<_, AlertRuleRow>(
        "SELECT id, metric, min_value, max_value, channel, target, enabled \
         FROM alert_rules ORDER BY metric",
    )
    .fetch_all(pool)
    .await?;
    Ok(alerts)
}

pub async fn insert_alert_rule(pool: &SqlitePool, rule: &NewAlertRule) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO alert_rules (metric, min_value, max_value, channel, target, enabled, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&rule.metric)
    .bind(rule.min_value)
    .bind(rule.max_value)
    .bind(&rule.channel)
    .bind(&rule.target)
    .bind(rule.enabled)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
