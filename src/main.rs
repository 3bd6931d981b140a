use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use medi_dispatch::api;
use medi_dispatch::config::{Config, LogFormat};
use medi_dispatch::engine::simulation;
use medi_dispatch::error::AppError;
use medi_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    init_tracing(&config);

    let shared_state = Arc::new(AppState::new(config.clone())?);

    let photos = shared_state.photos.clone();
    tokio::spawn(async move {
        match photos.ensure_bucket().await {
            Ok(()) => tracing::info!(backend = photos.backend_name(), "photo bucket ready"),
            Err(err) => tracing::warn!(
                backend = photos.backend_name(),
                error = %err,
                "could not create photo bucket; uploads may fail"
            ),
        }
    });

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    let running: Vec<_> = shared_state
        .simulations
        .iter()
        .map(|entry| *entry.key())
        .collect();
    for delivery_id in running {
        simulation::stop(&shared_state, delivery_id);
    }

    tracing::info!("http server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match config.log_format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
