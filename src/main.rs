//! Newsdesk - news portal server

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::{
    api::{self, AppState},
    config::{Config, IdentityDriver},
    identity::{FirebaseIdentityProvider, IdentityProvider, MemoryIdentityProvider},
    services::NewsClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting newsdesk...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let shutdown = CancellationToken::new();

    // Identity provider
    let provider: Arc<dyn IdentityProvider> = match config.identity.driver {
        IdentityDriver::Firebase => {
            if config.identity.api_key.is_empty() {
                tracing::warn!("identity.api_key is empty; Firebase will reject sign-ins");
            }
            let firebase = Arc::new(FirebaseIdentityProvider::new(&config.identity));
            firebase.clone().spawn_refresher(shutdown.clone());
            firebase
        }
        IdentityDriver::Memory => {
            tracing::warn!("Using in-memory accounts; they are lost on restart");
            Arc::new(MemoryIdentityProvider::new(config.identity.session_ttl_secs))
        }
    };
    tracing::info!("Identity provider: {:?}", config.identity.driver);

    // News API client
    let news = Arc::new(NewsClient::new(&config.news)?);

    // Build application state
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, provider, news)?;
    state.spawn_background_tasks(&shutdown);

    // Build router
    let app = api::build_router(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    state.feeds.clear();
    state.sessions.teardown().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
