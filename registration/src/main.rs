//! Registration HTTP server.

use registration::{
    AppState, Config, build_router, idempotency::RedisIdempotencyStore,
};
use seatline_core::cursor::CursorCodec;
use seatline_core::environment::SystemClock;
use seatline_postgres::PostgresRegistrationStore;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,registration=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting registration server");

    let config = Config::from_env();
    info!(
        address = %config.server_address(),
        max_connections = config.postgres.max_connections,
        deadline_ms = config.admission.deadline_ms,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let store = Arc::new(
        PostgresRegistrationStore::connect(&config.postgres.url, config.postgres.max_connections)
            .await?,
    );
    if config.postgres.run_migrations {
        store.migrate().await?;
        info!("Migrations applied");
    }

    info!("Connecting to Redis...");
    let idempotency = Arc::new(
        RedisIdempotencyStore::new(&config.redis.url, config.redis.idempotency_ttl()).await?,
    );

    let state = AppState::new(
        store,
        Arc::new(SystemClock),
        idempotency,
        CursorCodec::new(config.pagination.cursor_secret.as_bytes()),
    )
    .with_retry_policy(config.admission.retry_policy())
    .with_admission_deadline(config.admission.deadline())
    .with_page_limits(config.pagination.default_limit, config.pagination.max_limit);

    let app = build_router(state);

    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
