//! Relay Gateway - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use relay_gateway::{api, config, db, idempotency};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_gateway=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Relay Gateway"
    );

    // Build application state; DATABASE_URL selects the storage backend
    let state = match &config.database_url {
        Some(database_url) => {
            let pool = db::create_pool(database_url).await?;
            db::run_migrations(&pool).await?;
            api::AppState::with_postgres(config.clone(), pool)
        }
        None => {
            info!("No DATABASE_URL configured, using in-memory storage");
            api::AppState::in_memory(config.clone())
        }
    };

    info!(
        storage = state.storage_backend(),
        allowlist_entries = state.allowlist.len(),
        "Gateway state initialized"
    );

    // Recurring idempotency cleanup, hourly
    tokio::spawn(idempotency::run_cleanup_worker(
        Arc::clone(&state.idempotency),
        Duration::from_secs(3600),
    ));

    // Drop expired rate-limit counters every five minutes
    let limiter = Arc::clone(&state.limiter);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.prune();
        }
    });

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Gateway listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("Gateway shutdown complete");

    Ok(())
}
