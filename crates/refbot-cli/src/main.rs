//! # refbot
//!
//! Binary entry point for the refbot chat bot.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Logging setup
//! - `refbot run`: the supervised bot process (default)
//! - `refbot status` / `refbot unlock`: inspect or clear the instance lock

mod lock_cli;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use refbot_core::{EXIT_FAILURE, EXIT_SUCCESS, LockError, SupervisorError};
use tracing::{error, warn};

/// Output format for the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for programmatic access
    Json,
}

/// refbot - Telegram referral bot process
#[derive(Parser, Debug)]
#[command(name = "refbot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "refbot.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot (default if no subcommand given)
    Run(run::RunArgs),

    /// Show whether an instance holds the lock file
    Status(lock_cli::StatusArgs),

    /// Remove a stale lock file left behind by a crashed instance
    Unlock(lock_cli::UnlockArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map a failure to the process exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<SupervisorError>()
        .map_or(EXIT_FAILURE, SupervisorError::exit_code);
    code as u8
}

fn report_error(err: &anyhow::Error) {
    if let Some(SupervisorError::Lock(LockError::AlreadyRunning { path, holder })) =
        err.downcast_ref::<SupervisorError>()
    {
        match holder {
            Some(holder) => error!(
                path = %path.display(),
                pid = holder.pid,
                started = %holder.started,
                "Another instance of the bot is already running. Exiting..."
            ),
            None => error!(
                path = %path.display(),
                "Another instance of the bot is already running. Exiting..."
            ),
        }
        return;
    }
    error!(error = format!("{err:#}"), "Bot stopped with an error");
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before tracing so RUST_LOG may come from .env
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dotenv
        && !e.not_found()
    {
        warn!(error = %e, "Failed to load .env file");
    }

    let result = match cli.command {
        Some(Commands::Run(args)) => run::run_command(&cli.config, args).await,
        Some(Commands::Status(args)) => lock_cli::status_command(&cli.config, args),
        Some(Commands::Unlock(args)) => lock_cli::unlock_command(&cli.config, args),
        None => run::run_command(&cli.config, run::RunArgs::default()).await,
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS as u8),
        Err(err) => {
            report_error(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}
