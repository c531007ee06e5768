//! Database pool collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while bringing the pool up.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The connection settings are invalid (bad URL, bad limits).
    #[error("database pool misconfigured: {0}")]
    Config(String),

    /// The backing store could not be reached.
    #[error("database unreachable: {0}")]
    Unreachable(String),
}

/// Lifecycle of the process-wide database pool.
///
/// The supervisor treats `init` failures as fatal and calls `close` from every
/// cleanup path, so `close` must be a no-op when the pool is already closed or
/// was never opened.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn init(&self) -> Result<(), PoolError>;

    async fn close(&self);
}

#[async_trait]
impl<T: ConnectionPool + ?Sized> ConnectionPool for Arc<T> {
    async fn init(&self) -> Result<(), PoolError> {
        (**self).init().await
    }

    async fn close(&self) {
        (**self).close().await;
    }
}
