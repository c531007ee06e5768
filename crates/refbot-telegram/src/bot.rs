use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use refbot_proto::{
    BotClient, BotError, BotResult, IncomingUpdate, PollOptions, UpdateSink, mask_secret,
};
use teloxide::payloads::GetUpdatesSetters;
use teloxide::requests::Requester;
use teloxide::types::{Update, UpdateKind};
use tracing::debug;

use crate::error::to_bot_error;

/// Wraps a `teloxide::Bot` and long-polls `getUpdates` for refbot.
///
/// The HTTP client's request timeout is fixed when the bot is built, so it is
/// taken from [`PollOptions::timeout`] at construction; each poll round only
/// passes [`PollOptions::long_polling_timeout`] to Telegram.
pub struct TelegramBot {
    bot: teloxide::Bot,
    token: String,
    offset: AtomicI32,
    sink: Arc<dyn UpdateSink>,
}

impl TelegramBot {
    /// Create a client whose HTTP requests time out after `request_timeout`.
    pub fn new(
        token: &str,
        request_timeout: Duration,
        sink: Arc<dyn UpdateSink>,
    ) -> BotResult<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BotError::unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            bot: teloxide::Bot::with_client(token, client),
            token: token.to_string(),
            offset: AtomicI32::new(0),
            sink,
        })
    }

    /// Point the client at a different Bot API server (local server, tests).
    pub fn with_api_url(mut self, url: &str) -> BotResult<Self> {
        let url = url
            .parse::<reqwest::Url>()
            .map_err(|e| BotError::unknown(format!("invalid API URL {url}: {e}")))?;
        self.bot = self.bot.set_api_url(url);
        Ok(self)
    }

    /// Next `getUpdates` offset (last seen update ID + 1).
    pub fn offset(&self) -> i32 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Bot token masked for logging.
    pub fn token_masked(&self) -> String {
        mask_secret(&self.token)
    }
}

impl fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramBot")
            .field("token", &self.token_masked())
            .field("offset", &self.offset())
            .finish_non_exhaustive()
    }
}

/// Extract the parts of an update the sink cares about.
fn to_incoming(update: &Update) -> IncomingUpdate {
    #[allow(clippy::cast_possible_wrap)]
    let update_id = update.id.0 as i32;

    let (chat_id, text) = match update.kind {
        UpdateKind::Message(ref msg) => (Some(msg.chat.id.0), msg.text().map(String::from)),
        _ => (None, None),
    };

    IncomingUpdate {
        update_id,
        chat_id,
        text,
    }
}

#[async_trait]
impl BotClient for TelegramBot {
    async fn remove_webhook(&self) -> BotResult<()> {
        self.bot.delete_webhook().await.map_err(to_bot_error)?;
        debug!("Webhook removed");
        Ok(())
    }

    async fn poll(&self, options: &PollOptions) -> BotResult<usize> {
        let offset = self.offset();
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(options.long_polling_timeout.as_secs() as u32)
            .await
            .map_err(to_bot_error)?;

        let count = updates.len();
        for update in &updates {
            let incoming = to_incoming(update);
            // Acknowledge before handing off so a sink panic cannot replay it
            self.offset
                .fetch_max(incoming.update_id + 1, Ordering::SeqCst);
            self.sink.handle(incoming).await;
        }

        if count > 0 {
            debug!(count, offset = self.offset(), "Dispatched updates");
        }
        Ok(count)
    }
}
