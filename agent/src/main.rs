mod buffer;
mod config;
mod errors;
mod flush;
mod scheduler;
mod sensors;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "agent", about = "Home environment sensor polling agent")]
struct Args {
    /// Path to the agent configuration file
    #[arg(
        long,
        env = "MONITOR_AGENT_CONFIG",
        default_value = "/etc/monitor-agent/config.toml"
    )]
    config: PathBuf,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match config::AgentConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config {}: {}", args.config.display(), e);
            process::exit(1);
        }
    };

    info!("Starting sensor agent");
    info!("Ingestion endpoint: {}", config.api.url);
    info!("Sensors configured: {}", config.sensors.len());

    let tasks = match scheduler::build_tasks(&config.sensors) {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("Failed to initialize sensors: {}", e);
            process::exit(1);
        }
    };

    let buffer = Arc::new(buffer::ReadingBuffer::new(config.batch.buffer_capacity));
    let transport: Arc<dyn flush::Transport> = match flush::HttpTransport::new(&config.api) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to build HTTP transport: {}", e);
            process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut scheduler_handle = tokio::spawn(scheduler::run(
        tasks,
        buffer.clone(),
        shutdown_rx.clone(),
    ));
    let mut flush_handle = tokio::spawn(flush::run(
        buffer,
        transport,
        Duration::from_secs(config.batch.flush_interval_sec),
        shutdown_rx,
    ));

    tokio::select! {
        _ = &mut scheduler_handle => {
            error!("Scheduler task terminated unexpectedly");
        }
        _ = &mut flush_handle => {
            error!("Flush task terminated unexpectedly");
            return;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    // Stop the timers; the flush task drains once more before exiting.
    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.batch.shutdown_grace_sec);
    if tokio::time::timeout(grace, flush_handle).await.is_err() {
        warn!("Final flush did not finish within {:?}", grace);
    }

    info!("Shutting down");
}
