use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_RECEIVED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_readings_received_total",
        "Total readings received on the ingestion endpoint"
    ))
    .unwrap();
    pub static ref READINGS_INGESTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_readings_ingested_total",
        "Total readings persisted after validation"
    ))
    .unwrap();
    pub static ref READINGS_REJECTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_readings_rejected_total",
        "Total readings rejected by per-record validation"
    ))
    .unwrap();
    pub static ref SENSORS_REGISTERED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_sensors_registered_total",
        "Total sensors auto-registered from first-seen readings"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "monitor_ingest_latency_seconds",
            "Time taken to validate and persist an ingestion batch"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY
        .register(Box::new(READINGS_RECEIVED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(READINGS_INGESTED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(READINGS_REJECTED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(SENSORS_REGISTERED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
