use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::buffer::ReadingBuffer;
use crate::config::SensorConfig;
use crate::errors::Result;
use crate::sensors::{build_driver, SensorDriver, SensorMeta};

/// A sensor ready for scheduling: identity plus its driver behind a lock so
/// an in-flight read is skipped rather than overlapped.
pub struct SensorTask {
    meta: Arc<SensorMeta>,
    interval: Duration,
    driver: Arc<Mutex<Box<dyn SensorDriver>>>,
}

impl SensorTask {
    pub fn new(meta: SensorMeta, interval: Duration, driver: Box<dyn SensorDriver>) -> Self {
        Self {
            meta: Arc::new(meta),
            interval,
            driver: Arc::new(Mutex::new(driver)),
        }
    }
}

pub fn build_tasks(configs: &[SensorConfig]) -> Result<Vec<SensorTask>> {
    let mut tasks = Vec::new();
    for config in configs {
        if !config.enabled {
            info!("Sensor {} is disabled, skipping", config.key);
            continue;
        }
        let driver = build_driver(config)?;
        tasks.push(SensorTask::new(
            SensorMeta::from_config(config),
            Duration::from_secs(config.interval_sec),
            driver,
        ));
    }
    Ok(tasks)
}

/// Run every sensor on its own fixed cadence until shutdown.
///
/// The schedule is a min-heap of (next-fire-time, sensor-index) pairs, which
/// keeps firing order explicit and deterministic under a simulated clock.
/// Reads run in spawned tasks so one slow sensor never delays another
/// sensor's deadline; each sensor is rescheduled at `deadline + interval`
/// the moment it fires, independent of read latency.
pub async fn run(
    tasks: Vec<SensorTask>,
    buffer: Arc<ReadingBuffer>,
    mut shutdown: watch::Receiver<bool>,
) {
    if tasks.is_empty() {
        warn!("No enabled sensors configured, scheduler is idle");
        let _ = shutdown.changed().await;
        return;
    }

    info!("Scheduling {} sensors", tasks.len());
    let mut queue: BinaryHeap<Reverse<(Instant, usize)>> = BinaryHeap::new();
    let start = Instant::now();
    for index in 0..tasks.len() {
        queue.push(Reverse((start, index)));
    }

    while let Some(&Reverse((deadline, index))) = queue.peek() {
        tokio::select! {
            _ = sleep_until(deadline) => {
                queue.pop();
                let task = &tasks[index];
                spawn_read(task, &buffer);
                queue.push(Reverse((deadline + task.interval, index)));
            }
            _ = shutdown.changed() => {
                info!("Scheduler stopping");
                return;
            }
        }
    }
}

fn spawn_read(task: &SensorTask, buffer: &Arc<ReadingBuffer>) {
    let meta = task.meta.clone();
    let driver = task.driver.clone();
    let buffer = buffer.clone();
    tokio::spawn(async move {
        // A read still running from the previous fire wins; skip this cycle.
        let Ok(mut driver) = driver.try_lock() else {
            warn!("Sensor {} read still in progress, skipping cycle", meta.key);
            return;
        };
        match driver.read().await {
            Ok(values) if values.is_empty() => {}
            Ok(values) => {
                // Capture time, shared by every metric from this read.
                let recorded_at = Utc::now();
                let readings = values
                    .iter()
                    .map(|value| meta.reading(value, recorded_at))
                    .collect();
                buffer.push(readings);
            }
            Err(e) => {
                warn!("Sensor {} read failed: {}", meta.key, e);
            }
        }
    });
}
