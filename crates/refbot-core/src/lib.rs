//! # refbot-core
//!
//! Process supervision for the refbot chat bot.
//!
//! This crate provides:
//! - The single-instance lock marker ([`instance_lock`])
//! - Configuration loading from YAML and the environment ([`config`])
//! - Signal-driven shutdown through a cancellation token ([`shutdown`])
//! - The poll-retry loop with per-failure-class policy ([`poll_loop`])
//! - The [`Supervisor`] that sequences startup, polling, and cleanup
//! - Scripted collaborators for tests ([`testing`])

pub mod config;
pub mod instance_lock;
pub mod poll_loop;
pub mod shutdown;
mod supervisor;
pub mod testing;

pub use config::{BotConfig, ConfigError, DatabaseConfig, RetryConfig, TelegramConfig};
pub use instance_lock::{InstanceLock, LockError, LockGuard, LockMetadata};
pub use poll_loop::{PollAborted, PollLoop, PollReport, RetryDecision, RetryPolicy};
pub use shutdown::install_signal_handlers;
pub use supervisor::{EXIT_FAILURE, EXIT_SUCCESS, Supervisor, SupervisorError};
