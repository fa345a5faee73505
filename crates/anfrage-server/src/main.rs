//! Anfrage Desk - HTTP server entry point

use anfrage_api::{create_router, AppState, Repositories};
use anfrage_common::config::{Config, LoggingConfig};
use anfrage_core::{ImapMailbox, SmtpMailer};
use anfrage_storage::DatabasePool;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Anfrage Desk...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    // Mail adapters
    let timeout = Duration::from_secs(config.mail.timeout_secs);
    let transport = Arc::new(SmtpMailer::new(timeout));
    let mailbox = Arc::new(ImapMailbox::new(timeout, config.fetch.mailbox.clone()));

    let state = AppState::new(
        &config,
        Repositories::postgres(&db_pool),
        transport,
        mailbox,
        Some(db_pool),
    )?;
    let app = create_router(Arc::new(state), &config.api.cors_origins);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, "Anfrage Desk listening");

    // Peer addresses are needed by the cron guard
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Anfrage Desk shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
