//! Configuration loading for refbot.
//!
//! Settings come from an optional YAML file (`refbot.yml`), then environment
//! variables, then CLI overrides applied by the binary. Missing sections fall
//! back to defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use refbot_proto::{PollOptions, mask_secret};
use serde::{Deserialize, Serialize};

use crate::instance_lock::InstanceLock;
use crate::poll_loop::RetryPolicy;

/// Environment variables consulted for the bot token, in order.
pub const BOT_TOKEN_ENV_VARS: [&str; 2] = ["REFBOT_TELEGRAM_BOT_TOKEN", "TELEGRAM_BOT_TOKEN"];

/// Environment variable consulted for the database URL.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";

/// Extra time granted to the HTTP request beyond the server-side long poll.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error(
        "telegram bot token not found: set REFBOT_TELEGRAM_BOT_TOKEN or configure telegram.bot_token"
    )]
    MissingBotToken,

    #[error("database URL not found: set DATABASE_URL or configure database.url")]
    MissingDatabaseUrl,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Location of the single-instance marker.
    pub lock_file: PathBuf,
    pub telegram: TelegramConfig,
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from(InstanceLock::DEFAULT_PATH),
            telegram: TelegramConfig::default(),
            database: DatabaseConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    /// Client-side request timeout for one poll round.
    pub timeout_secs: u64,
    /// How long Telegram may hold a `getUpdates` request open.
    pub long_polling_timeout_secs: u64,
    /// Bot API server to talk to instead of `api.telegram.org` (for a
    /// self-hosted `telegram-bot-api`).
    pub api_url: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            timeout_secs: 60,
            long_polling_timeout_secs: 60,
            api_url: None,
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_deref().map(mask_secret))
            .field("timeout_secs", &self.timeout_secs)
            .field("long_polling_timeout_secs", &self.long_polling_timeout_secs)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_deref().map(mask_database_url))
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed backoff between failed poll rounds.
    pub delay_secs: u64,
    /// Stop polling instead of retrying when the API rejects the token.
    pub fail_fast_on_auth: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_secs: 5,
            fail_fast_on_auth: true,
        }
    }
}

impl BotConfig {
    /// Parse configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from YAML text.
    pub fn parse_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Load from `path` if it exists, defaults otherwise, then apply env.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill secrets from the environment.
    ///
    /// Environment values win over the file. `lookup` is injected so tests
    /// do not have to mutate the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = BOT_TOKEN_ENV_VARS
            .iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        {
            self.telegram.bot_token = Some(token);
        }
        if let Some(url) = lookup(DATABASE_URL_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.database.url = Some(url);
        }
    }

    /// Check the settings needed to run the bot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token().is_none() {
            return Err(ConfigError::MissingBotToken);
        }
        if self.database_url().is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        if self.retry.delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry.delay_secs must be greater than zero".to_string(),
            ));
        }
        if self.telegram.long_polling_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "telegram.long_polling_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.database.acquire_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "database.acquire_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds database.max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if self.lock_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("lock_file must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn bot_token(&self) -> Option<&str> {
        self.telegram
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_delay()).fail_fast_on_auth(self.retry.fail_fast_on_auth)
    }

    /// Poll timeouts, with the request timeout raised to cover the long poll.
    pub fn poll_options(&self) -> PollOptions {
        let long_polling_timeout = Duration::from_secs(self.telegram.long_polling_timeout_secs);
        let requested = Duration::from_secs(self.telegram.timeout_secs);
        PollOptions {
            timeout: requested.max(long_polling_timeout + REQUEST_TIMEOUT_MARGIN),
            long_polling_timeout,
        }
    }
}

/// Hide the password component of a database URL.
pub fn mask_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "****".to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:****@{host}")
        }
        None => url.to_string(),
    }
}
