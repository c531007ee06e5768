//! Mock bot client that replays a script of poll outcomes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use refbot_proto::{BotClient, BotError, BotResult, IncomingUpdate, PollOptions, UpdateSink};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::CallLog;

/// One scripted poll outcome.
#[derive(Debug, Clone)]
pub enum PollStep {
    /// The round succeeds and delivers this many updates.
    Deliver(usize),
    /// The round fails with this error.
    Fail(BotError),
}

/// Bot double that returns pre-scripted poll outcomes.
///
/// Once the script runs out, `poll` blocks forever, like a long poll with
/// nothing to deliver. Use [`ScriptedBot::cancel_when_exhausted`] to end a
/// test run at that point.
#[derive(Debug, Default)]
pub struct ScriptedBot {
    steps: Mutex<VecDeque<PollStep>>,
    poll_times: Mutex<Vec<Instant>>,
    webhook_calls: AtomicUsize,
    webhook_error: Option<BotError>,
    when_exhausted: Option<CancellationToken>,
    log: Option<CallLog>,
}

impl ScriptedBot {
    /// Creates a bot that plays `steps` in order.
    pub fn new(steps: Vec<PollStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Make `remove_webhook` fail with `error`.
    pub fn failing_webhook(mut self, error: BotError) -> Self {
        self.webhook_error = Some(error);
        self
    }

    /// Cancel `token` when a poll finds the script empty.
    pub fn cancel_when_exhausted(mut self, token: CancellationToken) -> Self {
        self.when_exhausted = Some(token);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns the number of times `poll` was called.
    pub fn poll_count(&self) -> usize {
        self.poll_times().len()
    }

    /// Returns when each `poll` call started.
    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn webhook_calls(&self) -> usize {
        self.webhook_calls.load(Ordering::SeqCst)
    }

    fn record(&self, entry: &str) {
        if let Some(log) = &self.log {
            log.record(entry);
        }
    }
}

#[async_trait]
impl BotClient for ScriptedBot {
    async fn remove_webhook(&self) -> BotResult<()> {
        self.webhook_calls.fetch_add(1, Ordering::SeqCst);
        self.record("bot.remove_webhook");
        match &self.webhook_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn poll(&self, _options: &PollOptions) -> BotResult<usize> {
        self.poll_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());
        self.record("bot.poll");

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match step {
            Some(PollStep::Deliver(count)) => Ok(count),
            Some(PollStep::Fail(err)) => Err(err),
            None => {
                if let Some(token) = &self.when_exhausted {
                    token.cancel();
                }
                std::future::pending().await
            }
        }
    }
}

/// Update sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<IncomingUpdate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<IncomingUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl UpdateSink for RecordingSink {
    async fn handle(&self, update: IncomingUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
    }
}
