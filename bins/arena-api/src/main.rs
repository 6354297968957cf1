mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use arena_common::config::ArenaConfig;
use arena_common::store::RedisStore;
use axum::Router;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub store: RedisStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arena API booting...");

    let config = ArenaConfig::from_env();
    serve(&config).await
}

async fn serve(config: &ArenaConfig) -> Result<()> {
    // Connect to Redis
    let client = redis::Client::open(config.redis_url.as_str())
        .with_context(|| format!("Invalid Redis URL: {}", config.redis_url))?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;

    info!("Connected to Redis: {}", config.redis_url);

    metrics::register();

    let state = Arc::new(AppState {
        store: RedisStore::new(redis_conn.clone()),
        redis: redis_conn,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let listener = TcpListener::bind(config.api_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_addr))?;

    info!("HTTP server listening on {}", config.api_addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
