use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mailtrack::config::{Config, DatabaseBackend, PrefetchPolicy};
use mailtrack::dispatch::{create_tracking_router, TrackingState};
use mailtrack::storage::{PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mailtrack=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let state = TrackingState::from_config(Arc::clone(&storage), &config)?;

    if config.geo.api_key.is_none() {
        warn!("GEO_API_KEY is not set - events will be recorded without geo metadata");
    }
    info!(
        "Geo enrichment via '{}' (budget {} ms)",
        state.geo.provider_name(),
        state.geo.budget().as_millis()
    );

    match state.classifier.policy() {
        PrefetchPolicy::ProxyImpliesHuman => info!(
            "Opens are recorded only for image-proxy fetches ({:?})",
            config.prefetch.proxy_signatures
        ),
        PrefetchPolicy::ProxyIsBot => info!(
            "Image-proxy fetches ({:?}) are ignored as prefetches",
            config.prefetch.proxy_signatures
        ),
    }

    if !config.trusted_proxies.is_empty() {
        info!(
            "X-Forwarded-For honored only from {} trusted network(s)",
            config.trusted_proxies.len()
        );
    }

    let router = create_tracking_router(Arc::new(state));

    let addr = format!(
        "{}:{}",
        config.tracking_server.host, config.tracking_server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Tracking server listening on http://{}", addr);
    info!("   - Pixel:    http://{}/track?api_key=..&uid=..", addr);
    info!("   - Redirect: http://{}/click?api_key=..&uid=..&url=..", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Tracking server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
