use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use edge_guard::config::{CacheBackend, Settings};
use edge_guard::core::{Cache, MemoryCache, RedisCache};
use edge_guard::service;
use edge_guard::utils::{init_logging, init_metrics, GuardError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("Starting edge guard service...");

    let settings = Settings::load()
        .map_err(GuardError::Config)
        .context("Failed to load configuration")?;
    settings
        .validate()
        .context("Configuration validation failed")?;
    tracing::info!(
        host = %settings.server.host,
        port = %settings.server.port,
        production = %settings.runtime.production,
        "Configuration loaded"
    );

    if settings.metrics.enabled {
        init_metrics().context("Failed to install metrics recorder")?;
        tracing::info!("Prometheus metrics exporter installed");
    }

    let cache: Arc<dyn Cache> = match settings.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Redis => {
            // validate() guarantees a URL is present for the redis backend
            let url = settings
                .cache
                .url
                .as_deref()
                .context("cache.url missing for redis backend")?;
            Arc::new(RedisCache::new(url).context("Failed to connect to Redis")?)
        }
    };

    let state = service::build_state(Arc::new(settings.clone()), cache)
        .context("Failed to build application state")?;
    let router = service::build_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid bind address")?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::Server::bind(&addr)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Wait for the shutdown signal (Ctrl+C)
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
