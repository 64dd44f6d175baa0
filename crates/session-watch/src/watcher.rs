//! Lifecycle of a running watcher: start, state, and cooperative stop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    config::WatcherConfig,
    relay::{Dispatcher, Exit, Relay, wait_exit},
    sys::{Backend, ListenerCtx, LoopControl},
};

/// Source of process-unique watcher ids.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Allocate the next id.
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Observable lifecycle state of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// The listener thread is pumping messages.
    Running,
    /// The listener thread has exited.
    Stopped,
}

/// What happened to the watcher's threads during [`SessionWatcher::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// The listener thread that owns the hidden window.
    pub listener: Exit,
    /// The worker thread that calls the relay.
    pub relay: Exit,
    /// Events dropped over the watcher's lifetime because the relay fell
    /// behind or its worker was gone.
    pub dropped: u64,
    /// Relay calls that panicked. Each panic loses only its own event.
    pub relay_panics: u64,
}

impl StopOutcome {
    /// True when both threads exited and were joined.
    pub fn is_clean(&self) -> bool {
        self.listener == Exit::Joined && self.relay == Exit::Joined
    }
}

/// A running session watcher.
///
/// Owns the listener thread (hidden window, session subscription, dispatch
/// loop) and the relay worker. Dropping the handle stops the watcher.
pub struct SessionWatcher {
    /// Process-unique id.
    id: WatcherId,
    /// Registered window class name.
    class_name: String,
    /// Configuration the watcher was started with.
    config: WatcherConfig,
    /// Stop control shared with the listener thread.
    ctrl: Arc<LoopControl>,
    /// Relay worker and its queue.
    dispatcher: Dispatcher,
    /// Listener thread; `None` once stopped.
    listener: Option<JoinHandle<()>>,
    /// Disconnects when the listener thread exits.
    listener_done: Receiver<()>,
}

impl SessionWatcher {
    /// Start watching with the default configuration.
    pub fn start(relay: impl Relay) -> Result<Self> {
        Self::start_with(WatcherConfig::default(), relay)
    }

    /// Start watching with `config`.
    ///
    /// Returns once the hidden window is subscribed to session
    /// notifications, or with the error that prevented it.
    #[cfg(windows)]
    pub fn start_with(config: WatcherConfig, relay: impl Relay) -> Result<Self> {
        Self::launch(config, Arc::new(relay), crate::sys::win32::Win32Backend)
    }

    /// Start watching with `config`.
    ///
    /// Session notifications only exist on Windows; elsewhere this always
    /// fails with [`Error::Unsupported`].
    #[cfg(not(windows))]
    pub fn start_with(config: WatcherConfig, relay: impl Relay) -> Result<Self> {
        config.validate()?;
        drop(relay);
        Err(Error::Unsupported)
    }

    /// Start a watcher backed by a simulated message source.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn start_simulated(
        config: WatcherConfig,
        relay: impl Relay,
        sim: crate::sys::sim::Simulator,
    ) -> Result<Self> {
        Self::launch(config, Arc::new(relay), sim)
    }

    /// Spawn the relay worker and the listener thread, then wait for setup.
    fn launch<B: Backend>(config: WatcherConfig, relay: Arc<dyn Relay>, backend: B) -> Result<Self> {
        config.validate()?;
        let id = WatcherId::next();
        let class_name = config.class_name(id.get());
        let mut dispatcher = Dispatcher::spawn(
            format!("session-relay-{}", id.get()),
            config.queue_capacity,
            relay,
        )?;
        let ctrl = Arc::new(LoopControl::new());
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (done_tx, done_rx) = bounded::<()>(0);

        let sink = dispatcher.sink();
        let thread_ctrl = ctrl.clone();
        let thread_class = class_name.clone();
        let spawned = thread::Builder::new()
            .name(format!("session-listener-{}", id.get()))
            .spawn(move || {
                let _done = done_tx;
                backend.run(ListenerCtx {
                    class_name: &thread_class,
                    sink,
                    ready: &ready_tx,
                    ctrl: &thread_ctrl,
                });
            });
        let listener = match spawned {
            Ok(h) => h,
            Err(e) => {
                warn!(id = id.get(), error = %e, "listener_spawn_failed");
                dispatcher.close(config.stop_timeout);
                return Err(Error::Spawn(e));
            }
        };

        let setup = match ready_rx.recv_timeout(config.ready_timeout) {
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => Err(Error::ReadyTimeout(config.ready_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ListenerExited),
        };
        if let Err(e) = setup {
            ctrl.stop();
            if matches!(e, Error::ReadyTimeout(_)) {
                // Stuck in native setup; it exits on its own once it sees the
                // stop request.
                warn!(id = id.get(), "listener_not_ready_detaching");
            } else if wait_exit(&done_rx, config.stop_timeout) {
                let _ = listener.join();
            }
            dispatcher.close(config.stop_timeout);
            return Err(e);
        }

        info!(id = id.get(), class = %class_name, "session_watcher_started");
        Ok(Self {
            id,
            class_name,
            config,
            ctrl,
            dispatcher,
            listener: Some(listener),
            listener_done: done_rx,
        })
    }

    /// This watcher's id.
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// The window class name registered by this watcher.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Current lifecycle state. Reports [`WatcherState::Stopped`] if the
    /// listener thread ended on its own.
    pub fn state(&self) -> WatcherState {
        match &self.listener {
            Some(h) if !h.is_finished() => WatcherState::Running,
            _ => WatcherState::Stopped,
        }
    }

    /// Shorthand for `state() == WatcherState::Running`.
    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }

    /// Events dropped so far because the relay fell behind.
    pub fn dropped(&self) -> u64 {
        self.dispatcher.dropped()
    }

    /// Relay calls that have panicked so far.
    pub fn relay_panics(&self) -> u64 {
        self.dispatcher.panics()
    }

    /// Stop the watcher.
    ///
    /// No relay call starts after this begins. The listener is asked to quit
    /// and tears down its subscription, window and class in that order; the
    /// relay worker is then shut down. Each thread gets the configured stop
    /// timeout and is detached if it overruns, so this never blocks on a relay
    /// that does not return.
    pub fn stop(mut self) -> StopOutcome {
        self.shutdown()
    }

    /// Shared by [`Self::stop`] and `Drop`.
    fn shutdown(&mut self) -> StopOutcome {
        let timeout = self.config.stop_timeout;
        self.dispatcher.deactivate();
        self.ctrl.stop();

        let listener = match self.listener.take() {
            None => Exit::Joined,
            Some(h) => {
                if wait_exit(&self.listener_done, timeout) {
                    if h.join().is_err() {
                        warn!(id = self.id.get(), "listener_panicked");
                    }
                    Exit::Joined
                } else {
                    warn!(id = self.id.get(), ?timeout, "listener_stuck_detaching");
                    Exit::Abandoned
                }
            }
        };
        let relay = self.dispatcher.close(timeout);
        let outcome = StopOutcome {
            listener,
            relay,
            dropped: self.dispatcher.dropped(),
            relay_panics: self.dispatcher.panics(),
        };
        if outcome.is_clean() {
            info!(
                id = self.id.get(),
                dropped = outcome.dropped,
                relay_panics = outcome.relay_panics,
                "session_watcher_stopped"
            );
        } else {
            warn!(id = self.id.get(), ?outcome, "session_watcher_stopped_with_leaks");
        }
        outcome
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        if self.listener.is_some() {
            debug!(id = self.id.get(), "session_watcher_dropped_while_running");
            self.shutdown();
        }
    }
}
