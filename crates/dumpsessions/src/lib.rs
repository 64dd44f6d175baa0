//! Print Windows session changes as they happen and run hooks on them.
//!
//! The binary starts a [`session_watch::SessionWatcher`] whose relay forwards
//! every event into a tokio channel. [`pump`] drains that channel, writes one
//! line per event and launches any configured [`hooks::Hook`] whose trigger
//! matches, until the shutdown future resolves. Hooks with the `start`
//! trigger run once before the first event; hooks marked `as_user` are
//! launched inside the user's session on Windows.

use std::{future::Future, io::Write, path::PathBuf};

use session_watch::SessionEvent;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

mod as_user;
pub mod hooks;
pub mod output;
pub mod settings;

/// Errors surfaced by the `dumpsessions` tool.
#[derive(Debug, Error)]
pub enum Error {
    /// The settings file could not be read.
    #[error("Read error at {}: {message}", path.display())]
    Read {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },
    /// The settings file is not valid TOML for [`settings::Settings`].
    #[error("Settings parse error: {0}")]
    Parse(String),
    /// A hook entry is invalid.
    #[error("Invalid hook #{index}: {message}")]
    InvalidHook {
        /// Zero-based position in the file.
        index: usize,
        /// What is wrong with it.
        message: String,
    },
    /// A hook could not be launched in any user session.
    #[error("Failed to launch {program}: {message}")]
    Launch {
        /// Program the hook runs.
        program: String,
        /// Why the last attempt failed.
        message: String,
    },
    /// The watcher rejected its configuration or failed to start.
    #[error(transparent)]
    Watcher(#[from] session_watch::Error),
    /// Writing output failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Drain events until `shutdown` resolves or the channel closes.
///
/// Each event is written to `out` as one line in `format`, then handed to
/// every matching hook. Returns the number of events written.
pub async fn pump<W, S>(
    mut rx: UnboundedReceiver<SessionEvent>,
    hooks: &[hooks::Hook],
    format: output::Format,
    mut out: W,
    shutdown: S,
) -> Result<u64>
where
    W: Write,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut n = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!(events = n, "shutdown_requested");
                break;
            }
            ev = rx.recv() => {
                let Some(ev) = ev else { break };
                writeln!(out, "{}", output::render(&ev, format))?;
                out.flush()?;
                hooks::fire_matching(hooks, &ev);
                n += 1;
            }
        }
    }
    Ok(n)
}
