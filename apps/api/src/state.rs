use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::jwt::JwtManager;
use crate::cache::ProfileCache;
use crate::config::Config;
use crate::storage::ObjectStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// S3 in production, in-memory in tests.
    pub storage: Arc<dyn ObjectStore>,
    pub cache: ProfileCache,
    pub jwt: Arc<JwtManager>,
    pub config: Config,
}
