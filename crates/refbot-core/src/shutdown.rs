//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a shared [`CancellationToken`]. The handler does
//! no cleanup itself: the poll loop observes the token, returns, and the
//! supervisor closes the pool and removes the lock marker.

use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Register SIGINT/SIGTERM handlers that cancel `token`.
///
/// Registration happens before this returns, so a failure to install a
/// handler is reported to the caller rather than lost in a task. The
/// returned task ends when a signal arrives or when `token` is cancelled
/// by someone else.
#[cfg(unix)]
pub fn install_signal_handlers(token: CancellationToken) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    // equivalent to Ctrl+C
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            () = token.cancelled() => return,
        };
        info!(signal = name, "Received signal, shutting down gracefully");
        token.cancel();
    }))
}

// Best-effort implementation for non-unix systems
#[cfg(not(unix))]
pub fn install_signal_handlers(token: CancellationToken) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
            }
            () = token.cancelled() => return,
        }
        info!(signal = "CTRL+C", "Received signal, shutting down gracefully");
        token.cancel();
    }))
}
