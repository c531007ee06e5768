//! # refbot-proto
//!
//! Shared types, error definitions, and collaborator traits for refbot.
//!
//! The supervisor in `refbot-core` only sequences calls into collaborators it
//! does not own. This crate defines those seams:
//! - [`BotClient`] - webhook reset and one long-poll round against the bot API
//! - [`ConnectionPool`] - database pool init and teardown
//! - [`UpdateSink`] - whatever consumes the updates a poll delivers
//!
//! [`mask_secret`] keeps tokens out of logs for every crate.

pub mod bot;
mod error;
pub mod pool;
mod secret;

pub use bot::{BotClient, IncomingUpdate, PollOptions, UpdateSink};
pub use error::{BotError, BotResult, FailureKind};
pub use pool::{ConnectionPool, PoolError};
pub use secret::mask_secret;
