//! Process supervision: startup sequencing, polling, and cleanup.
//!
//! Order is strict: instance lock → pool init → webhook reset → signal
//! handlers → poll loop. Whatever way the loop ends, the pool is closed and
//! the lock marker removed before [`Supervisor::run`] returns. The lock
//! guard's `Drop` covers paths that never reach the cleanup step (panics,
//! a dropped future).

use std::io;
use std::path::PathBuf;

use refbot_proto::{BotClient, ConnectionPool, PollOptions, PoolError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::instance_lock::{InstanceLock, LockError, LockGuard};
use crate::poll_loop::{PollAborted, PollLoop, PollReport, RetryPolicy};
use crate::shutdown::install_signal_handlers;

/// Exit status for every startup or runtime failure.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status after a graceful shutdown.
pub const EXIT_SUCCESS: i32 = 0;

/// Reasons the supervisor stopped without a graceful shutdown.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Lock conflict or failure to create the marker.
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to initialize database pool: {0}")]
    PoolInit(#[source] PoolError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error(transparent)]
    Polling(#[from] PollAborted),
}

impl SupervisorError {
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }

    /// True when another instance holds the lock marker.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, SupervisorError::Lock(LockError::AlreadyRunning { .. }))
    }
}

/// Owns the bot client and pool and runs the process lifecycle.
pub struct Supervisor<B, P> {
    bot: B,
    pool: P,
    lock_path: PathBuf,
    poll_options: PollOptions,
    retry_policy: RetryPolicy,
    install_signals: bool,
}

impl<B: BotClient, P: ConnectionPool> Supervisor<B, P> {
    /// Create a supervisor with lock path, timeouts and retry policy taken
    /// from `config`.
    pub fn new(bot: B, pool: P, config: &BotConfig) -> Self {
        Self {
            bot,
            pool,
            lock_path: config.lock_file.clone(),
            poll_options: config.poll_options(),
            retry_policy: config.retry_policy(),
            install_signals: true,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Skip SIGINT/SIGTERM registration; the caller owns the token.
    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signals = false;
        self
    }

    /// Run the whole lifecycle.
    ///
    /// Returns `Ok` after `shutdown` is cancelled (by a signal or by the
    /// caller) and cleanup has run.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PollReport, SupervisorError> {
        let mut guard = InstanceLock::acquire(&self.lock_path)?;
        info!(path = %guard.lock_path().display(), "Acquired instance lock");

        let outcome = self.serve(&shutdown).await;
        self.cleanup(&mut guard).await;

        if let Ok(report) = &outcome {
            info!(
                polls = report.successful_polls,
                failures = report.failed_polls,
                updates = report.updates,
                "Bot stopped"
            );
        }
        outcome
    }

    async fn serve(&self, shutdown: &CancellationToken) -> Result<PollReport, SupervisorError> {
        info!("Connecting to database...");
        self.pool.init().await.map_err(SupervisorError::PoolInit)?;

        info!("Resetting webhook (if any)...");
        if let Err(e) = self.bot.remove_webhook().await {
            warn!(kind = %e.kind, error = %e.message, "Webhook reset failed, continuing");
        }

        let listener = if self.install_signals {
            Some(install_signal_handlers(shutdown.clone()).map_err(SupervisorError::Signals)?)
        } else {
            None
        };

        info!(
            timeout_secs = self.poll_options.timeout.as_secs(),
            long_polling_timeout_secs = self.poll_options.long_polling_timeout.as_secs(),
            retry_delay_secs = self.retry_policy.delay().as_secs(),
            "Starting the bot..."
        );
        let result = PollLoop::new(&self.bot, self.poll_options, self.retry_policy.clone())
            .run(shutdown)
            .await;

        if let Some(listener) = listener {
            listener.abort();
        }

        result.map_err(SupervisorError::Polling)
    }

    /// Close the pool, then remove the marker. Each step runs regardless of
    /// the other.
    async fn cleanup(&self, guard: &mut LockGuard) {
        info!("Shutting down...");
        self.pool.close().await;
        if let Err(e) = guard.release() {
            warn!(
                path = %guard.lock_path().display(),
                error = %e,
                "Failed to remove instance lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, PollStep, RecordingPool, ScriptedBot};
    use refbot_proto::{BotError, FailureKind};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        lock_path: PathBuf,
        token: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let lock_path = dir.path().join("bot.lock");
            Self {
                _dir: dir,
                lock_path,
                token: CancellationToken::new(),
            }
        }

        fn supervisor(
            &self,
            bot: Arc<ScriptedBot>,
            pool: Arc<RecordingPool>,
        ) -> Supervisor<Arc<ScriptedBot>, Arc<RecordingPool>> {
            let config = BotConfig {
                lock_file: self.lock_path.clone(),
                ..BotConfig::default()
            };
            Supervisor::new(bot, pool, &config)
                .with_retry_policy(RetryPolicy::new(Duration::from_millis(10)))
                .without_signal_handlers()
        }
    }

    async fn wait_for_polls(bot: &ScriptedBot, count: usize) {
        while bot.poll_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn startup_runs_in_order_and_cleans_up_on_shutdown() {
        let harness = Harness::new();
        let log = CallLog::new();
        let bot = Arc::new(
            ScriptedBot::new(vec![PollStep::Deliver(2)])
                .cancel_when_exhausted(harness.token.clone())
                .with_log(log.clone()),
        );
        let pool = Arc::new(RecordingPool::new().with_log(log.clone()));

        let report = harness
            .supervisor(bot.clone(), pool.clone())
            .run(harness.token.clone())
            .await
            .unwrap();

        assert_eq!(report.updates, 2);
        assert_eq!(
            log.entries(),
            vec![
                "pool.init",
                "bot.remove_webhook",
                "bot.poll",
                "bot.poll",
                "pool.close"
            ]
        );
        assert!(!harness.lock_path.exists());
        assert!(!pool.is_open());
    }

    #[tokio::test]
    async fn shutdown_removes_marker_and_closes_pool_once() {
        let harness = Harness::new();
        let bot = Arc::new(ScriptedBot::new(Vec::new()));
        let pool = Arc::new(RecordingPool::new());

        let run = tokio::spawn(
            harness
                .supervisor(bot.clone(), pool.clone())
                .run(harness.token.clone()),
        );

        wait_for_polls(&bot, 1).await;
        assert!(harness.lock_path.exists());
        assert!(pool.is_open());

        harness.token.cancel();
        let result = run.await.unwrap();

        assert!(result.is_ok());
        assert!(!harness.lock_path.exists());
        assert_eq!(pool.close_calls(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigint_shuts_down_gracefully() {
        use nix::sys::signal::{Signal, raise};

        let harness = Harness::new();
        let bot = Arc::new(ScriptedBot::new(Vec::new()));
        let pool = Arc::new(RecordingPool::new());
        let config = BotConfig {
            lock_file: harness.lock_path.clone(),
            ..BotConfig::default()
        };

        // Signal handlers stay installed
        let run = tokio::spawn(
            Supervisor::new(bot.clone(), pool.clone(), &config).run(harness.token.clone()),
        );

        // Polling starts only after the handlers are registered
        while bot.poll_count() < 1 && !run.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        if !run.is_finished() {
            assert!(harness.lock_path.exists());
            raise(Signal::SIGINT).unwrap();
        }

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("supervisor did not stop after SIGINT")
            .unwrap();

        assert!(result.is_ok());
        assert!(harness.token.is_cancelled());
        assert!(!harness.lock_path.exists());
        assert_eq!(pool.close_calls(), 1);
        assert!(!pool.is_open());
    }

    #[tokio::test]
    async fn second_launch_conflicts_and_leaves_first_instance_alone() {
        let harness = Harness::new();
        let first_bot = Arc::new(ScriptedBot::new(Vec::new()));
        let first_pool = Arc::new(RecordingPool::new());
        let first = tokio::spawn(
            harness
                .supervisor(first_bot.clone(), first_pool.clone())
                .run(harness.token.clone()),
        );
        wait_for_polls(&first_bot, 1).await;
        let marker = std::fs::read_to_string(&harness.lock_path).unwrap();

        let second_bot = Arc::new(ScriptedBot::new(Vec::new()));
        let second_pool = Arc::new(RecordingPool::new());
        let err = harness
            .supervisor(second_bot.clone(), second_pool.clone())
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_lock_conflict());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(second_pool.init_calls(), 0);
        assert_eq!(second_pool.close_calls(), 0);
        assert_eq!(second_bot.webhook_calls(), 0);
        assert_eq!(std::fs::read_to_string(&harness.lock_path).unwrap(), marker);
        assert!(first_pool.is_open());

        harness.token.cancel();
        assert!(first.await.unwrap().is_ok());
        assert!(!harness.lock_path.exists());
    }

    #[tokio::test]
    async fn stale_marker_blocks_start() {
        let harness = Harness::new();
        std::fs::write(&harness.lock_path, "locked").unwrap();
        let pool = Arc::new(RecordingPool::new());

        let err = harness
            .supervisor(Arc::new(ScriptedBot::new(Vec::new())), pool.clone())
            .run(harness.token.clone())
            .await
            .unwrap_err();

        assert!(err.is_lock_conflict());
        assert!(harness.lock_path.exists());
        assert_eq!(pool.init_calls(), 0);
    }

    #[tokio::test]
    async fn pool_init_failure_prevents_polling() {
        let harness = Harness::new();
        let bot = Arc::new(ScriptedBot::new(vec![PollStep::Deliver(1)]));
        let pool = Arc::new(RecordingPool::failing("connection refused"));

        let err = harness
            .supervisor(bot.clone(), pool.clone())
            .run(harness.token.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::PoolInit(_)));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(bot.webhook_calls(), 0);
        assert_eq!(bot.poll_count(), 0);
        assert!(!harness.lock_path.exists());
        assert_eq!(pool.close_calls(), 1);
    }

    #[tokio::test]
    async fn webhook_failure_does_not_block_startup() {
        let harness = Harness::new();
        let bot = Arc::new(
            ScriptedBot::new(vec![PollStep::Deliver(1)])
                .failing_webhook(BotError::transient("timed out"))
                .cancel_when_exhausted(harness.token.clone()),
        );
        let pool = Arc::new(RecordingPool::new());

        let report = harness
            .supervisor(bot.clone(), pool.clone())
            .run(harness.token.clone())
            .await
            .unwrap();

        assert_eq!(pool.init_calls(), 1);
        assert_eq!(bot.webhook_calls(), 1);
        assert_eq!(report.successful_polls, 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let harness = Harness::new();
        let bot = Arc::new(
            ScriptedBot::new(vec![
                PollStep::Fail(BotError::transient("connection reset")),
                PollStep::Fail(BotError::new(FailureKind::Unknown, "boom")),
                PollStep::Deliver(1),
            ])
            .cancel_when_exhausted(harness.token.clone()),
        );
        let pool = Arc::new(RecordingPool::new());

        let report = harness
            .supervisor(bot.clone(), pool)
            .run(harness.token.clone())
            .await
            .unwrap();

        assert_eq!(report.failed_polls, 2);
        assert_eq!(report.successful_polls, 1);
    }

    #[tokio::test]
    async fn auth_failure_stops_and_cleans_up() {
        let harness = Harness::new();
        let bot = Arc::new(ScriptedBot::new(vec![PollStep::Fail(
            BotError::authentication("Unauthorized"),
        )]));
        let pool = Arc::new(RecordingPool::new());

        let err = harness
            .supervisor(bot.clone(), pool.clone())
            .run(harness.token.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::Polling(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(!harness.lock_path.exists());
        assert_eq!(pool.close_calls(), 1);
    }

    #[tokio::test]
    async fn dropped_run_still_removes_marker() {
        let harness = Harness::new();
        let bot = Arc::new(ScriptedBot::new(Vec::new()));
        let run = tokio::spawn(
            harness
                .supervisor(bot.clone(), Arc::new(RecordingPool::new()))
                .run(harness.token.clone()),
        );
        wait_for_polls(&bot, 1).await;
        assert!(harness.lock_path.exists());

        run.abort();
        let _ = run.await;

        assert!(!harness.lock_path.exists());
    }
}
