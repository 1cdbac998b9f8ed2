use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use app_config::{AppConfig, Server};
use app_database::connect_store;
use app_error::AppError;
use app_utils::mailer_from_config;
use micro_catalog::{AppState, create_routes, telemetry};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::load()?;

    // Initialize sentry and the logger
    let _guard = telemetry::init_tracing(&config.monitoring)?;

    info!(
        environment = %config.environment,
        backend = ?config.database.backend,
        "Starting MovieVerse at {}",
        chrono::Utc::now()
    );

    let server = Server::from(&config);
    server.validate()?;

    let store = connect_store(&config.database).await?;
    let mailer = mailer_from_config(&config.mail)?;
    let bootstrap_admin = config.bootstrap_admin.clone();
    let state = AppState::new(config, store, mailer);

    if let Some(seed) = &bootstrap_admin {
        state.auth.ensure_admin(seed).await?;
    }

    let app = create_routes(state);

    let address = server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .context(format!("Failed to bind to address: {}", address))?;

    info!("Listening on http://{}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
