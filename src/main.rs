use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod config;
mod db;
mod discovery;
mod error;
mod models;
mod overlay;

use cli::Cli;
use config::DiscoveryConfig;
use db::Database;
use discovery::DiscoveryServer;
use error::AppError;
use models::AppState;
use overlay::GatewayClient;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize environment
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    let db = Arc::new(Database::open(&cli.pool_database)?);

    let gateway = config::gateway_url(&cli.ledger_gateway)?;
    let http_client = overlay::create_http_client(cli.request_timeout())?;
    let overlay = Arc::new(GatewayClient::new(http_client, &gateway)?);
    tracing::info!("Reaching networks through ledger gateway {}", gateway);

    let server = Arc::new(DiscoveryServer::new(
        db.clone(),
        overlay,
        DiscoveryConfig::from_cli(&cli),
    ));

    // Create shutdown signal channel
    let (shutdown_tx, _) = broadcast::channel(1);

    // Start discovery in a separate task
    let discovery_handle = {
        let server = server.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            match server.start(shutdown_rx).await {
                Err(AppError::Cancelled) | Ok(()) => {
                    tracing::info!("Discovery server stopped");
                }
                Err(e) => {
                    tracing::error!("Discovery server failed: {}", e);
                }
            }
        })
    };

    let state = AppState {
        db,
        networks: server.network_state(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&cli.address)
        .await
        .map_err(|e| AppError::ServerError(format!("Failed to bind {}: {}", cli.address, e)))?;
    tracing::info!("Server started at http://{}", cli.address);

    // Stop accepting connections and signal background tasks on Ctrl-C
    let shutdown_tx_for_signal = shutdown_tx.clone();
    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("Error handling shutdown signal: {}", err);
                return;
            }

            tracing::info!("Received shutdown signal, beginning graceful shutdown...");

            if let Err(e) = shutdown_tx_for_signal.send(()) {
                tracing::warn!("Failed to send shutdown signal: {}", e);
            }
        })
        .await;

    // Covers the server exiting on its own
    let _ = shutdown_tx.send(());

    // A pass in progress is allowed to finish, but not to hold the process forever
    tracing::info!("Waiting for discovery to complete...");
    match tokio::time::timeout(tokio::time::Duration::from_secs(5), discovery_handle).await {
        Ok(Ok(())) => tracing::debug!("Discovery task completed successfully"),
        Ok(Err(e)) => tracing::warn!("Discovery task ended with error: {}", e),
        Err(_) => tracing::warn!("Discovery task did not complete within timeout"),
    }

    tracing::info!("Shutdown complete");
    server_result.map_err(|e| AppError::ServerError(e.to_string()))
}
