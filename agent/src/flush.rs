use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::model::{IngestRequest, IngestResponse, Reading};
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::buffer::ReadingBuffer;
use crate::config::ApiConfig;
use crate::errors::Result;

/// Transport used to deliver reading batches to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a batch, returning the number of readings the server ingested.
    async fn send(&self, readings: &[Reading]) -> Result<usize>;
}

pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_sec))
            .build()?;
        Ok(Self {
            client,
            url: api.url.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, readings: &[Reading]) -> Result<usize> {
        let request = IngestRequest {
            readings: readings.to_vec(),
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: IngestResponse = response.json().await?;
        Ok(body.ingested)
    }
}

/// Drain the buffer on a fixed interval, independent of sensor cadences.
/// Exits after a best-effort final flush once shutdown is signalled; the
/// caller bounds that with a timeout.
pub async fn run(
    buffer: Arc<ReadingBuffer>,
    transport: Arc<dyn Transport>,
    flush_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting flush task with interval {:?}", flush_interval);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_once(&buffer, transport.as_ref()).await;
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("Flushing remaining readings before shutdown");
    flush_once(&buffer, transport.as_ref()).await;
}

/// One flush cycle. A failed delivery re-queues the batch so the next tick
/// retries it; readings are lost only to buffer overflow.
pub async fn flush_once(buffer: &ReadingBuffer, transport: &dyn Transport) {
    let batch = buffer.drain();
    if batch.is_empty() {
        return;
    }

    let sent = batch.len();
    match transport.send(&batch).await {
        Ok(ingested) if ingested < sent => {
            warn!("Server ingested {} of {} readings", ingested, sent);
        }
        Ok(_) => debug!("Flushed {} readings", sent),
        Err(e) => {
            warn!(
                "Flush of {} readings failed: {}, retrying on next tick",
                sent, e
            );
            buffer.requeue(batch);
        }
    }
}
