use std::sync::Arc;

use anyhow::{self, Error as AnyhowError};
use server::{AppState, file_logging, routes};
use services::services::{
    config::{ConfigError, WwwConfig},
    sdb::{SdbClient, SdbError},
};
use thiserror::Error;
use utils::crypto::SessionError;

#[derive(Debug, Error)]
pub enum WwwError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sdb(#[from] SdbError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[tokio::main]
async fn main() -> Result<(), WwwError> {
    dotenvy::dotenv().ok();

    // The guard flushes the file writer on drop; hold it until exit.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _file_log_guard = file_logging::init_logging(&log_level);

    let config = WwwConfig::from_env()?;
    let client = SdbClient::new(&config)?;
    if let Err(e) = client.authenticate().await {
        tracing::warn!(
            "Failed to obtain a SoliDB service token, SDBQL calls will fail until SoliDB is reachable: {}",
            e
        );
    }

    let bind_addr = config.bind_addr();
    let state = AppState::new(config, Arc::new(client))?;
    let app_router = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Server running on http://{local_addr}");

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    tracing::info!("Server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
