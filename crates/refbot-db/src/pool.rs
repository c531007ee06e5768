//! Postgres pool lifecycle.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use refbot_proto::{ConnectionPool, PoolError};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info, instrument};

/// Connection settings for the pool.
#[derive(Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

/// Process-wide Postgres pool, opened by `init` and released by `close`.
pub struct PgConnectionPool {
    settings: PoolSettings,
    pool: Mutex<Option<PgPool>>,
}

impl PgConnectionPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            pool: Mutex::new(None),
        }
    }

    /// Handle to the open pool, if any. `PgPool` is reference counted, so the
    /// clone shares connections with this pool.
    pub fn get(&self) -> Option<PgPool> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_open(&self) -> bool {
        self.get().is_some_and(|pool| !pool.is_closed())
    }
}

impl fmt::Debug for PgConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectionPool")
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .finish()
    }
}

fn classify_sqlx_error(err: sqlx::Error) -> PoolError {
    match err {
        sqlx::Error::Configuration(e) => PoolError::Config(e.to_string()),
        other => PoolError::Unreachable(other.to_string()),
    }
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    #[instrument(skip_all)]
    async fn init(&self) -> Result<(), PoolError> {
        if self.is_open() {
            debug!("Database pool already initialized");
            return Ok(());
        }

        let options: PgConnectOptions = self.settings.url.parse().map_err(classify_sqlx_error)?;

        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .min_connections(self.settings.min_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(classify_sqlx_error)?;

        info!(
            max_connections = self.settings.max_connections,
            "Database pool initialized"
        );
        *self.pool.lock().unwrap_or_else(PoisonError::into_inner) = Some(pool);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn close(&self) {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match pool {
            Some(pool) => {
                pool.close().await;
                info!("Database pool closed");
            }
            None => debug!("Database pool already closed"),
        }
    }
}
