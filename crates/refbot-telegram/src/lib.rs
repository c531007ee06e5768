//! # refbot-telegram
//!
//! Telegram implementation of the refbot [`BotClient`](refbot_proto::BotClient).
//!
//! - [`TelegramBot`] - `deleteWebhook` at startup, then `getUpdates` long polling
//! - [`LoggingSink`] - default consumer that logs each incoming update
//! - [`classify_request_error`] - maps teloxide errors onto refbot failure classes

mod bot;
mod error;
mod sink;

pub use bot::TelegramBot;
pub use error::{classify_request_error, to_bot_error};
pub use sink::LoggingSink;
