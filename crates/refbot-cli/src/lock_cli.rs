//! `refbot status` and `refbot unlock`: inspect or clear the instance lock.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Args;
use refbot_core::{BotConfig, InstanceLock, LockMetadata};
use tracing::{info, warn};

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Lock file to inspect (defaults to the configured path)
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Lock file to remove (defaults to the configured path)
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Remove the marker even if its holder is still alive
    #[arg(long)]
    pub force: bool,
}

/// Liveness of the process named in the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holder {
    Alive,
    Dead,
    Unknown,
}

impl Holder {
    fn as_str(self) -> &'static str {
        match self {
            Holder::Alive => "alive",
            Holder::Dead => "dead",
            Holder::Unknown => "unknown",
        }
    }
}

#[cfg(unix)]
fn check_liveness(pid: u32) -> Holder {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Holder::Dead;
    };
    // Signal 0 only checks that the process exists
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Holder::Alive,
        Err(Errno::ESRCH) => Holder::Dead,
        Err(_) => Holder::Unknown,
    }
}

#[cfg(not(unix))]
fn check_liveness(_pid: u32) -> Holder {
    Holder::Unknown
}

fn holder_state(holder: Option<&LockMetadata>) -> Holder {
    holder.map_or(Holder::Unknown, |h| check_liveness(h.pid))
}

/// Lock path from the flag, else from config. Secrets are not required here.
fn resolve_lock_path(config_path: &Path, flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(BotConfig::load(config_path)?.lock_file),
    }
}

pub fn status_command(config_path: &Path, args: StatusArgs) -> Result<()> {
    let lock_path = resolve_lock_path(config_path, args.lock_file)?;
    let running = InstanceLock::is_held(&lock_path);
    let holder = if running {
        InstanceLock::read_existing(&lock_path)?
    } else {
        None
    };
    let state = running.then(|| holder_state(holder.as_ref()));

    match args.format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "lock_file": lock_path.display().to_string(),
                "running": running,
                "pid": holder.as_ref().map(|h| h.pid),
                "started": holder.as_ref().map(|h| h.started.to_rfc3339()),
                "holder": state.map(Holder::as_str),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            if !running {
                println!("Not running (no lock file at {})", lock_path.display());
                return Ok(());
            }
            println!("Running (lock file at {})", lock_path.display());
            match &holder {
                Some(h) => {
                    println!("  PID:     {}", h.pid);
                    println!("  Started: {}", h.started.to_rfc3339());
                }
                None => println!("  Holder:  not recorded in lock file"),
            }
            if let Some(state) = state {
                println!("  Process: {}", state.as_str());
            }
        }
    }
    Ok(())
}

pub fn unlock_command(config_path: &Path, args: UnlockArgs) -> Result<()> {
    let lock_path = resolve_lock_path(config_path, args.lock_file)?;
    if !InstanceLock::is_held(&lock_path) {
        println!("No lock file at {}", lock_path.display());
        return Ok(());
    }

    let holder = InstanceLock::read_existing(&lock_path)?;
    match (holder_state(holder.as_ref()), &holder) {
        (Holder::Alive, Some(h)) if !args.force => {
            bail!(
                "lock file {} is held by running process {} (use --force to remove anyway)",
                lock_path.display(),
                h.pid
            );
        }
        (Holder::Unknown, _) => {
            warn!(path = %lock_path.display(), "Lock holder unknown, removing marker");
        }
        _ => {}
    }

    if InstanceLock::release(&lock_path)? {
        info!(path = %lock_path.display(), "Removed instance lock");
        println!("Removed {}", lock_path.display());
    }
    Ok(())
}
