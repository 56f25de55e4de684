//! Doorward Registry Service - Main Entry Point

use anyhow::{Context, Result};
use config_loader::ServiceConfig;
use doorward_registry::{create_app, AppState};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,doorward_registry=debug,wards=debug")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Doorward Registry Service");

    let config = ServiceConfig::from_env().context("Failed to load service configuration")?;

    let state = match AppState::from_config(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            return Err(e);
        }
    };

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!("Doorward Registry listening on {}", config.bind_addr);

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
