//! Table service entry point.
//!
//! Serves the dashboard HTTP API and the real-time WebSocket endpoint
//! from one process.

use std::sync::Arc;

use anyhow::Result;
use gateway::{Hub, PROBE_INTERVAL};
use metrics_exporter_prometheus::PrometheusBuilder;
use sheet_client::SheetClient;
use table_service::{create_router, AppState, TableStore, UpdateBridge};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting table service");

    // Read configuration from environment
    let http_port: u16 = std::env::var("HTTP_PORT")
        .unwrap_or_else(|_| "8081".to_string())
        .parse()
        .unwrap_or(8081);
    let metrics_port: u16 = std::env::var("METRICS_PORT")
        .unwrap_or_else(|_| "9092".to_string())
        .parse()
        .unwrap_or(9092);

    info!("Configuration:");
    info!("  HTTP_PORT: {}", http_port);
    info!("  METRICS_PORT: {}", metrics_port);

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics_port))
        .install()?;
    info!("Prometheus metrics server started on port {}", metrics_port);

    // Shared state
    let store = TableStore::new();
    let sheets = SheetClient::new();
    let hub = Arc::new(Hub::new());

    // Liveness sweeper: one recurring task for the whole hub.
    let sweeper = hub.clone().spawn_sweeper(PROBE_INTERVAL);

    let bridge = UpdateBridge::new(hub.clone(), store.clone(), sheets.clone());
    let state = AppState {
        store,
        sheets,
        hub,
        bridge,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port)).await?;
    info!("Table service listening on http://0.0.0.0:{}", http_port);
    info!("Available endpoints:");
    info!("  POST /auth/register            - Create an account");
    info!("  POST /auth/login               - Open a session");
    info!("  GET  /tables                   - List tables");
    info!("  POST /tables                   - Register a table");
    info!("  GET  /tables/{{id}}/data         - Rows plus custom columns");
    info!("  POST /tables/{{id}}/refresh      - Resync from the source");
    info!("  GET  /ws                       - Real-time updates");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop probing once the server is gone.
    sweeper.abort();

    info!("Table service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
