//! Single-instance lock for the bot process.
//!
//! A marker file (by default `/tmp/bot.lock`) means "an instance is running".
//! A second process that finds the marker refuses to start. There is no
//! staleness check: a process that dies without cleaning up leaves a marker
//! that blocks restarts until an operator removes it (`refbot unlock`).
//!
//! The marker is created with `O_CREAT | O_EXCL`, so checking for it and
//! creating it happen in one filesystem operation.
//!
//! # Example
//!
//! ```no_run
//! use refbot_core::instance_lock::{InstanceLock, LockError};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     match InstanceLock::acquire("/tmp/bot.lock") {
//!         Ok(guard) => {
//!             println!("Acquired {}", guard.lock_path().display());
//!             // Marker is removed when guard is dropped
//!         }
//!         Err(LockError::AlreadyRunning { .. }) => std::process::exit(1),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

/// Metadata stored in the marker, readable by other processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Process ID of the lock holder.
    pub pid: u32,

    /// When the lock was acquired.
    pub started: DateTime<Utc>,
}

/// Holds the instance lock. The marker is removed when this is dropped.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Returns the path to the marker file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Remove the marker now. Calling this more than once is harmless.
    pub fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        InstanceLock::release(&self.lock_path)?;
        self.released = true;
        tracing::debug!(path = %self.lock_path.display(), "Released instance lock");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(
                path = %self.lock_path.display(),
                error = %e,
                "Failed to remove instance lock"
            );
        }
    }
}

/// Errors that can occur during lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The marker already exists: another instance is (or was) running.
    #[error("another instance is already running (lock file {})", .path.display())]
    AlreadyRunning {
        path: PathBuf,
        /// Holder metadata, when the marker content could be parsed.
        holder: Option<LockMetadata>,
    },

    /// IO error during lock operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to encode or decode lock metadata.
    #[error("Failed to parse lock metadata: {0}")]
    ParseError(String),
}

/// The instance lock mechanism.
pub struct InstanceLock;

impl InstanceLock {
    /// Marker location used when configuration does not name one.
    pub const DEFAULT_PATH: &'static str = "/tmp/bot.lock";

    /// Try to acquire the lock (non-blocking).
    ///
    /// # Returns
    ///
    /// * `Ok(LockGuard)` - Marker created, this process is the instance
    /// * `Err(LockError::AlreadyRunning { .. })` - Marker already present
    /// * `Err(LockError::Io(_))` - IO error
    pub fn acquire(lock_path: impl AsRef<Path>) -> Result<LockGuard, LockError> {
        let lock_path = lock_path.as_ref().to_path_buf();

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = Self::read_existing(&lock_path).ok().flatten();
                return Err(LockError::AlreadyRunning {
                    path: lock_path,
                    holder,
                });
            }
            Err(e) => return Err(e.into()),
        };

        // From here on the guard owns the marker, so a failed write below
        // still removes it.
        let guard = LockGuard {
            lock_path,
            released: false,
        };

        let metadata = LockMetadata {
            pid: process::id(),
            started: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| LockError::ParseError(e.to_string()))?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        tracing::debug!(path = %guard.lock_path.display(), "Acquired instance lock");
        Ok(guard)
    }

    /// Remove the marker if present.
    ///
    /// Returns `true` if a marker was removed, `false` if there was none.
    pub fn release(lock_path: impl AsRef<Path>) -> Result<bool, LockError> {
        match fs::remove_file(lock_path.as_ref()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a marker is present.
    pub fn is_held(lock_path: impl AsRef<Path>) -> bool {
        lock_path.as_ref().exists()
    }

    /// Read the holder metadata from an existing marker.
    ///
    /// Returns `Ok(None)` when there is no marker or its content is not
    /// metadata (for example a bare `locked` sentinel).
    pub fn read_existing(
        lock_path: impl AsRef<Path>,
    ) -> Result<Option<LockMetadata>, LockError> {
        let contents = match fs::read_to_string(lock_path.as_ref()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        Ok(serde_json::from_str(&contents).ok())
    }
}
