//! Warden Server - second-factor challenges and organization SSO login
//!
//! Endpoints:
//! - GET /api/0/authenticators/ - challenges for the caller's U2F device
//! - GET|POST /auth/login/{organization_slug}/ - organization login
//! - GET|POST /auth/login/ - generic login
//! - GET|POST /auth/sso/ - identity provider callback

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warden_server::{create_router, AppState, Config, Directory, MemoryDirectory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warden_server=info,warden_core=info,tower_http=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(config = ?config, "Configuration loaded");

    let directory = match &config.database_url {
        Some(url) => {
            let directory = Directory::with_postgres(
                url,
                config.database_max_connections,
                config.database_min_connections,
            )
            .await?;
            tracing::info!("Connected to PostgreSQL, migrations applied");
            directory
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using an empty in-memory directory");
            Directory::in_memory(Arc::new(MemoryDirectory::new()))
        }
    };

    let addr = config.socket_addr();
    let state = AppState::new(config, directory);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Warden server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
