use axum::{routing::get, Router};
use server::{db, metrics, rest};
use std::env;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/monitor.db".to_string());
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let allow_cors = env::var("ALLOW_CORS")
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting monitor server");
    info!("HTTP server: {}", http_addr);
    info!("Database: {}", database_url);

    // Initialize metrics
    metrics::init_metrics();

    // Connect to database
    let pool = match db::make_pool(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    // Build HTTP app with REST API and metrics endpoint
    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(pool));
    if allow_cors {
        app = app.layer(CorsLayer::permissive());
    }

    // Start HTTP server
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
