//! `refbot run`: wire the Telegram client and Postgres pool into the supervisor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use refbot_core::config::mask_database_url;
use refbot_core::{BotConfig, Supervisor};
use refbot_db::{PgConnectionPool, PoolSettings};
use refbot_telegram::{LoggingSink, TelegramBot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Override the instance lock file path
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Override the database URL (also read from DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Seconds to wait between failed poll rounds
    #[arg(long)]
    pub retry_delay: Option<u64>,
}

/// Load config, then layer CLI overrides on top of file and environment.
pub fn resolve_config(config_path: &Path, args: &RunArgs) -> Result<BotConfig> {
    let mut config = BotConfig::load(config_path)?;

    if let Some(lock_file) = &args.lock_file {
        config.lock_file.clone_from(lock_file);
    }
    if let Some(url) = &args.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(delay) = args.retry_delay {
        config.retry.delay_secs = delay;
    }

    config.validate()?;
    Ok(config)
}

pub async fn run_command(config_path: &Path, args: RunArgs) -> Result<()> {
    let config = resolve_config(config_path, &args)?;
    debug!(?config, "Resolved configuration");

    // validate() guarantees both are present
    let token = config.bot_token().unwrap_or_default();
    let database_url = config.database_url().unwrap_or_default();

    let poll_options = config.poll_options();
    let mut bot = TelegramBot::new(token, poll_options.timeout, Arc::new(LoggingSink))
        .context("failed to create Telegram client")?;
    if let Some(api_url) = &config.telegram.api_url {
        bot = bot.with_api_url(api_url)?;
        info!(api_url = %api_url, "Using custom Bot API server");
    }

    let settings = PoolSettings {
        url: database_url.to_string(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        acquire_timeout: std::time::Duration::from_secs(config.database.acquire_timeout_secs),
    };
    let pool = PgConnectionPool::new(settings);

    info!(
        token = %bot.token_masked(),
        database = %mask_database_url(database_url),
        lock_file = %config.lock_file.display(),
        "Starting refbot"
    );

    Supervisor::new(bot, pool, &config)
        .run(CancellationToken::new())
        .await?;
    Ok(())
}
