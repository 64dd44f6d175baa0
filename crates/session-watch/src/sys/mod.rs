//! Native message sources that drive the listener thread.
//!
//! A [`Backend`] owns everything the listener needs on its own thread: the
//! hidden window, the session subscription and the blocking dispatch loop.
//! Each backend reports setup success or failure exactly once on the ready
//! channel, installs a quit hook in [`LoopControl`] so other threads can end
//! the loop, and releases its resources in reverse acquisition order before
//! returning.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{Error, Result, relay::EventSink};

#[cfg(any(test, feature = "test-utils"))]
pub mod sim;
#[cfg(windows)]
pub(crate) mod win32;

/// Posts a quit request into a running loop.
type QuitFn = Box<dyn Fn() -> Result<()> + Send>;

/// Everything a backend receives when the listener thread starts.
pub(crate) struct ListenerCtx<'a> {
    /// Window class name unique to this watcher.
    pub(crate) class_name: &'a str,
    /// Where forwarded events go.
    pub(crate) sink: EventSink,
    /// Setup outcome, sent exactly once.
    pub(crate) ready: &'a Sender<Result<()>>,
    /// Shared stop control.
    pub(crate) ctrl: &'a LoopControl,
}

impl ListenerCtx<'_> {
    /// Report a setup failure to the starter.
    pub(crate) fn fail(&self, err: Error) {
        warn!(class = self.class_name, error = %err, "listener_setup_failed");
        let _ = self.ready.send(Err(err));
    }

    /// Report successful setup to the starter.
    pub(crate) fn ready(&self) {
        debug!(class = self.class_name, "listener_ready");
        let _ = self.ready.send(Ok(()));
    }
}

/// A source of OS session messages run on the listener thread.
pub(crate) trait Backend: Send + 'static {
    /// Acquire native resources, report readiness, pump messages until a
    /// quit request arrives, then tear everything down.
    fn run(self, ctx: ListenerCtx<'_>);
}

/// Shared control handle to stop the loop from other threads.
pub(crate) struct LoopControl {
    /// Installed by the backend once its loop can receive a quit request.
    quit: Mutex<Option<QuitFn>>,
    /// Set once stop has been requested.
    requested: AtomicBool,
}

impl LoopControl {
    /// A control with no quit hook and no stop requested.
    pub(crate) fn new() -> Self {
        Self {
            quit: Mutex::new(None),
            requested: AtomicBool::new(false),
        }
    }

    /// Install the quit hook for the running loop.
    pub(crate) fn set_quit(&self, quit: QuitFn) {
        *self.quit.lock() = Some(quit);
    }

    /// Whether a stop was requested, checked by backends before they block.
    pub(crate) fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request the loop to quit. Safe to call more than once.
    pub(crate) fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(quit) = self.quit.lock().take()
            && let Err(e) = quit()
        {
            warn!(error = %e, "post_quit_failed");
        }
    }
}
