//! The poll-retry loop.
//!
//! Two states: **Polling** (inside one long-poll round) and **Backoff**
//! (sleeping a fixed delay after a failed round). A failure moves the loop to
//! Backoff unless the [`RetryPolicy`] marks its [`FailureKind`] fatal; the
//! delay elapsing moves it back to Polling. The only other way out is the
//! shutdown token, which is observed in both states.

use std::time::Duration;

use refbot_proto::{BotClient, BotError, FailureKind, PollOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the loop does after a failed poll round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep the fixed delay, then poll again.
    Retry,
    /// Leave the loop with the error.
    Abort,
}

/// Fixed-delay retry policy with optional fail-fast on authentication errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    fail_fast_on_auth: bool,
}

impl RetryPolicy {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

    /// Retry every failure class except authentication.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_fast_on_auth: true,
        }
    }

    /// Retry every failure class, forever.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            delay,
            fail_fast_on_auth: false,
        }
    }

    pub fn fail_fast_on_auth(mut self, enabled: bool) -> Self {
        self.fail_fast_on_auth = enabled;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn decide(&self, kind: FailureKind) -> RetryDecision {
        match kind {
            FailureKind::Authentication if self.fail_fast_on_auth => RetryDecision::Abort,
            _ => RetryDecision::Retry,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

/// Counters collected while the loop ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub updates: u64,
}

/// The loop stopped because the policy refused to retry a failure.
#[derive(Debug, thiserror::Error)]
#[error("polling stopped after {} failed round(s): {source}", .report.failed_polls)]
pub struct PollAborted {
    pub source: BotError,
    pub report: PollReport,
}

/// Drives [`BotClient::poll`] until shutdown or a fatal failure.
pub struct PollLoop<'a, B: ?Sized> {
    bot: &'a B,
    options: PollOptions,
    policy: RetryPolicy,
}

impl<'a, B: BotClient + ?Sized> PollLoop<'a, B> {
    pub fn new(bot: &'a B, options: PollOptions, policy: RetryPolicy) -> Self {
        Self {
            bot,
            options,
            policy,
        }
    }

    /// Run until `shutdown` is cancelled (`Ok`) or a fatal failure (`Err`).
    ///
    /// Cancellation interrupts an in-flight poll round as well as a backoff
    /// sleep.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<PollReport, PollAborted> {
        let mut report = PollReport::default();
        let mut consecutive_failures: u32 = 0;

        loop {
            let attempt = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!("Shutdown requested while polling");
                    return Ok(report);
                }
                result = self.bot.poll(&self.options) => result,
            };

            match attempt {
                Ok(count) => {
                    if consecutive_failures > 0 {
                        info!(
                            failures = consecutive_failures,
                            "Polling recovered after failures"
                        );
                        consecutive_failures = 0;
                    }
                    report.successful_polls += 1;
                    report.updates += count as u64;
                }
                Err(err) => {
                    report.failed_polls += 1;
                    consecutive_failures += 1;

                    if self.policy.decide(err.kind) == RetryDecision::Abort {
                        error!(
                            kind = %err.kind,
                            error = %err.message,
                            "Polling failed with a non-retryable error"
                        );
                        return Err(PollAborted {
                            source: err,
                            report,
                        });
                    }

                    warn!(
                        kind = %err.kind,
                        error = %err.message,
                        attempt = consecutive_failures,
                        retry_in_secs = self.policy.delay().as_secs(),
                        "Polling failed, retrying"
                    );

                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => {
                            debug!("Shutdown requested during backoff");
                            return Ok(report);
                        }
                        () = tokio::time::sleep(self.policy.delay()) => {}
                    }
                }
            }
        }
    }
}
