//! Hand-off between the listener thread and the host's relay.
//!
//! The listener never calls the host directly. Each forwarded
//! [`SessionEvent`] is pushed into a bounded queue that a dedicated worker
//! drains, invoking the [`Relay`] once per event in arrival order. A slow
//! relay therefore delays later relay calls but never OS message delivery.
//! A relay that panics loses only the event it panicked on; the worker logs
//! the panic, counts it, and keeps delivering.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, select};
use tracing::{debug, trace, warn};

use crate::{Result, event::SessionEvent};

/// Receives session events from a running watcher.
///
/// Called on the watcher's relay worker thread, once per event, in the
/// order the OS delivered them. Implementations should return promptly:
/// events queue up behind a slow relay and are dropped once the queue is
/// full.
pub trait Relay: Send + Sync + 'static {
    /// Handle one event.
    fn relay(&self, event: SessionEvent);
}

impl<F> Relay for F
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    fn relay(&self, event: SessionEvent) {
        self(event)
    }
}

/// State shared between the sink handed to the listener and the dispatcher.
struct Shared {
    /// Cleared when stop begins; no relay call starts afterwards.
    active: AtomicBool,
    /// Events discarded because the queue was full or the worker was gone.
    drops: AtomicU64,
    /// Relay calls that panicked.
    panics: AtomicU64,
}

/// Producer side used by the listener thread.
#[derive(Clone)]
pub(crate) struct EventSink {
    /// Queue into the relay worker.
    tx: Sender<SessionEvent>,
    /// Shared delivery state.
    shared: Arc<Shared>,
}

impl EventSink {
    /// Queue an event for the relay without blocking.
    pub(crate) fn push(&self, event: SessionEvent) {
        if !self.shared.active.load(Ordering::SeqCst) {
            trace!(kind = event.kind, "event_after_stop_ignored");
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let n = self.shared.drops.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 || n.is_multiple_of(100) {
                    warn!(count = n, kind = event.kind, "relay_queue_full_event_dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                let n = self.shared.drops.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(count = n, kind = event.kind, "relay_worker_gone_event_dropped");
            }
        }
    }
}

/// Whether a thread finished within its stop deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The thread exited and was joined.
    Joined,
    /// The thread overran the deadline and was detached.
    Abandoned,
}

/// Wait up to `timeout` for the thread owning the other end of `done` to exit.
///
/// The thread never sends on `done`; it only drops its sender when it ends.
pub(crate) fn wait_exit(done: &Receiver<()>, timeout: Duration) -> bool {
    matches!(
        done.recv_timeout(timeout),
        Err(RecvTimeoutError::Disconnected) | Ok(())
    )
}

/// Owns the relay worker thread and its queue.
pub(crate) struct Dispatcher {
    /// Producer end kept so new sinks can be created.
    tx: Sender<SessionEvent>,
    /// Shared delivery state.
    shared: Arc<Shared>,
    /// Dropped to tell the worker to exit.
    shutdown: Option<Sender<()>>,
    /// Disconnects when the worker exits.
    done: Receiver<()>,
    /// Worker thread handle.
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the relay worker with a queue of `capacity` events.
    pub(crate) fn spawn(name: String, capacity: usize, relay: Arc<dyn Relay>) -> Result<Self> {
        let (tx, rx) = bounded::<SessionEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            drops: AtomicU64::new(0),
            panics: AtomicU64::new(0),
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new().name(name).spawn(move || {
            let _done = done_tx;
            run_worker(&rx, &shutdown_rx, &worker_shared, relay.as_ref());
        })?;
        Ok(Self {
            tx,
            shared,
            shutdown: Some(shutdown_tx),
            done: done_rx,
            worker: Some(worker),
        })
    }

    /// A producer handle for the listener thread.
    pub(crate) fn sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Stop starting new relay calls. Queued events are discarded.
    pub(crate) fn deactivate(&self) {
        self.shared.active.store(false, Ordering::SeqCst);
    }

    /// Number of events dropped because the queue was full or the worker
    /// had exited.
    pub(crate) fn dropped(&self) -> u64 {
        self.shared.drops.load(Ordering::SeqCst)
    }

    /// Number of relay calls that panicked.
    pub(crate) fn panics(&self) -> u64 {
        self.shared.panics.load(Ordering::SeqCst)
    }

    /// Deactivate, signal the worker and wait up to `timeout` for it.
    pub(crate) fn close(&mut self, timeout: Duration) -> Exit {
        self.deactivate();
        self.shutdown.take();
        let Some(worker) = self.worker.take() else {
            return Exit::Joined;
        };
        if wait_exit(&self.done, timeout) {
            if worker.join().is_err() {
                warn!("relay_worker_panicked");
            }
            Exit::Joined
        } else {
            warn!(?timeout, "relay_worker_stuck_detaching");
            Exit::Abandoned
        }
    }
}

/// Drain the queue into the relay until shutdown.
fn run_worker(
    rx: &Receiver<SessionEvent>,
    shutdown: &Receiver<()>,
    shared: &Shared,
    relay: &dyn Relay,
) {
    debug!("relay_worker_started");
    loop {
        select! {
            recv(rx) -> msg => {
                let Ok(event) = msg else { break };
                if !shared.active.load(Ordering::SeqCst) {
                    break;
                }
                trace!(kind = event.kind, wparam = event.wparam, lparam = event.lparam, "relay_event");
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| relay.relay(event))) {
                    let n = shared.panics.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(
                        count = n,
                        kind = event.kind,
                        wparam = event.wparam,
                        lparam = event.lparam,
                        panic = panic_message(payload.as_ref()),
                        "relay_panicked"
                    );
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("relay_worker_exited");
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}
