mod applications;
mod auth;
mod business;
mod cache;
mod config;
mod connections;
mod db;
mod errors;
mod extract;
#[cfg(test)]
mod fixtures;
mod jobs;
mod marketplace;
mod models;
mod onboarding;
mod pagination;
mod patch;
mod profile;
mod routes;
mod state;
mod storage;
mod team;
mod upload;
mod validation;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::jwt::JwtManager;
use crate::cache::ProfileCache;
use crate::config::Config;
use crate::db::create_pool;
use crate::routes::{build_router, cors_layer};
use crate::state::AppState;
use crate::storage::s3::S3ObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tradelink API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let cache = ProfileCache::new(redis, config.profile_cache_ttl_seconds);
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let storage = Arc::new(S3ObjectStore::from_config(&config).await);
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let jwt = Arc::new(JwtManager::new(&config.jwt_secret, config.jwt_ttl_seconds));

    let state = AppState {
        db,
        storage,
        cache,
        jwt,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config)?);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
