use async_trait::async_trait;
use refbot_proto::{IncomingUpdate, UpdateSink};
use tracing::{debug, info};

/// Update sink that only logs what arrives.
///
/// Message handling (referrals, persistence) plugs in by implementing
/// [`UpdateSink`]; this is the fallback used by the `refbot` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl UpdateSink for LoggingSink {
    async fn handle(&self, update: IncomingUpdate) {
        match update.text.as_deref() {
            Some(text) => {
                info!(
                    update_id = update.update_id,
                    chat_id = ?update.chat_id,
                    chars = text.chars().count(),
                    "Received message"
                );
                debug!(update_id = update.update_id, text = %text, "Message text");
            }
            None => debug!(update_id = update.update_id, "Received non-text update"),
        }
    }
}
