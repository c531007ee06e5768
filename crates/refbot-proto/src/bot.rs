//! Bot API collaborator.
//!
//! Defines the [`BotClient`] trait the supervisor drives. A client resets the
//! webhook once at startup and then performs long-poll rounds until the
//! process shuts down. Updates a round delivers are forwarded to an
//! [`UpdateSink`]; message handling itself lives outside this workspace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BotResult;

/// Timeouts for a single long-poll round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Client-side limit for the whole HTTP request.
    pub timeout: Duration,
    /// How long the server may hold the request open waiting for updates.
    pub long_polling_timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            long_polling_timeout: Duration::from_secs(60),
        }
    }
}

/// A minimal parsed update handed to the [`UpdateSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: i32,
    pub chat_id: Option<i64>,
    pub text: Option<String>,
}

/// Trait abstracting the bot API for testability.
///
/// Production code uses `refbot_telegram::TelegramBot`; tests use the scripted
/// mock in `refbot_core::testing`.
#[async_trait]
pub trait BotClient: Send + Sync {
    /// Clear any registered webhook so long polling is allowed.
    async fn remove_webhook(&self) -> BotResult<()>;

    /// Run one long-poll round.
    ///
    /// Blocks until updates arrive or `options.long_polling_timeout` elapses,
    /// dispatches whatever arrived and returns how many updates were handled.
    async fn poll(&self, options: &PollOptions) -> BotResult<usize>;
}

/// Consumer of updates delivered by a poll round.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn handle(&self, update: IncomingUpdate);
}

#[async_trait]
impl<T: BotClient + ?Sized> BotClient for Arc<T> {
    async fn remove_webhook(&self) -> BotResult<()> {
        (**self).remove_webhook().await
    }

    async fn poll(&self, options: &PollOptions) -> BotResult<usize> {
        (**self).poll(options).await
    }
}

#[async_trait]
impl<T: UpdateSink + ?Sized> UpdateSink for Arc<T> {
    async fn handle(&self, update: IncomingUpdate) {
        (**self).handle(update).await;
    }
}
