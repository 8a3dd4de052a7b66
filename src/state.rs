use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{auth::JwtKeys, config::Config, database::init_pool};

pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub jwt: JwtKeys,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let pool = init_pool(&config.database_url)
            .await
            .expect("Database misconfigured!");

        Self::with_pool(config, pool)
    }

    /// Build state around an existing pool. Tests use this with an
    /// in-memory database.
    pub fn with_pool(config: Config, pool: SqlitePool) -> Arc<Self> {
        let jwt = JwtKeys::new(config.jwt_secret.as_bytes());

        Arc::new(Self { config, pool, jwt })
    }
}
