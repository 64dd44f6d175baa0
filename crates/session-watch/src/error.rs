//! Error types and result alias for the session-watch crate.
use std::{io::Error as IoError, result::Result as StdResult, time::Duration};

use thiserror::Error;

/// Convenient result type used throughout this crate.
pub type Result<T> = StdResult<T, Error>;

/// Error variants produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The listener thread could not be created.
    #[error("Failed to spawn listener thread: {0}")]
    Spawn(#[from] IoError),
    /// The hidden window class could not be registered.
    #[error("Window class registration failed: {0}")]
    ClassRegistration(String),
    /// The message-only window could not be created.
    #[error("Message-only window creation failed: {0}")]
    WindowCreation(String),
    /// The window could not be subscribed to session notifications.
    #[error("Session notification subscription failed: {0}")]
    Subscription(String),
    /// The quit request could not be posted to the listener loop.
    #[error("Failed to post quit request: {0}")]
    PostQuit(String),
    /// The listener did not report readiness in time.
    #[error("Listener did not become ready within {0:?}")]
    ReadyTimeout(Duration),
    /// The listener thread exited without reporting readiness.
    #[error("Listener thread exited before reporting readiness")]
    ListenerExited,
    /// A watcher configuration value was rejected.
    #[error("Invalid watcher configuration: {0}")]
    InvalidConfig(&'static str),
    /// Session notifications are not available on this platform.
    #[error("Session notifications are only supported on Windows")]
    Unsupported,
}

impl Error {
    /// True for failures raised while acquiring the native window and
    /// subscription, as opposed to failures to launch the thread at all.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::ClassRegistration(_) | Self::WindowCreation(_) | Self::Subscription(_)
        )
    }
}
