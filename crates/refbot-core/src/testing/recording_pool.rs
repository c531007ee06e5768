//! Mock connection pool that counts lifecycle calls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use refbot_proto::{ConnectionPool, PoolError};

use super::CallLog;

/// Pool double that records `init`/`close` calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingPool {
    init_failure: Option<String>,
    init_calls: AtomicUsize,
    close_calls: AtomicUsize,
    open: AtomicBool,
    log: Option<CallLog>,
}

impl RecordingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `init` fail with [`PoolError::Unreachable`].
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            init_failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn record(&self, entry: &str) {
        if let Some(log) = &self.log {
            log.record(entry);
        }
    }
}

#[async_trait]
impl ConnectionPool for RecordingPool {
    async fn init(&self) -> Result<(), PoolError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.record("pool.init");
        if let Some(reason) = &self.init_failure {
            return Err(PoolError::Unreachable(reason.clone()));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.record("pool.close");
        self.open.store(false, Ordering::SeqCst);
    }
}
