//! In-process stand-in for the Win32 listener.
//!
//! The simulator runs on the real listener thread and goes through the same
//! lifecycle as the native backend: it "registers" the watcher's class name in
//! a process-wide table (rejecting duplicates), creates a window, subscribes,
//! reports readiness, pumps messages through the same routing as the window
//! procedure, and tears down in reverse order. Every step is recorded in a
//! [`Journal`] so tests can check ordering.
//!
//! Messages are injected with an [`Injector`]: [`Injector::post`] queues a
//! message like `PostMessageW`, [`Injector::send`] waits for the routing
//! decision like `SendMessageW`.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;
use tracing::debug;

use super::{Backend, ListenerCtx};
use crate::{
    Error,
    event::SessionEvent,
    route::{Reply, route},
};

/// Class names currently registered by simulated listeners.
static CLASSES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// The process-wide registry of simulated class names.
fn classes() -> &'static Mutex<HashSet<String>> {
    CLASSES.get_or_init(|| Mutex::new(HashSet::new()))
}

/// A setup stage that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Window class registration.
    RegisterClass,
    /// Message-only window creation.
    CreateWindow,
    /// Session notification subscription.
    Subscribe,
}

/// One acquire or release performed by a simulated listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Class registered.
    RegisterClass,
    /// Window created.
    CreateWindow,
    /// Subscribed to session notifications.
    Subscribe,
    /// Dispatch loop entered.
    Pump,
    /// Subscription removed.
    Unsubscribe,
    /// Window destroyed.
    DestroyWindow,
    /// Class unregistered.
    UnregisterClass,
}

/// Queue entries for the simulated message loop.
enum Msg {
    /// Fire-and-forget delivery.
    Post(SessionEvent),
    /// Delivery that reports the routing decision back.
    Send(SessionEvent, Sender<Reply>),
    /// Equivalent of `WM_QUIT`.
    Quit,
}

/// Shared record of what a simulated listener did.
#[derive(Clone, Default)]
pub struct Journal {
    steps: Arc<Mutex<Vec<Step>>>,
    class: Arc<Mutex<Option<String>>>,
}

impl Journal {
    /// Append a lifecycle step.
    fn record(&self, step: Step) {
        self.steps.lock().push(step);
    }

    /// Steps performed so far, in order.
    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().clone()
    }

    /// The class name the listener registered, if it got that far.
    pub fn class_name(&self) -> Option<String> {
        self.class.lock().clone()
    }
}

/// Injects messages into a simulated listener's queue.
#[derive(Clone)]
pub struct Injector {
    tx: Sender<Msg>,
}

impl Injector {
    /// Queue a message without waiting. Returns false once the loop is gone.
    pub fn post(&self, event: SessionEvent) -> bool {
        self.tx.send(Msg::Post(event)).is_ok()
    }

    /// Deliver a message and wait for the window procedure's answer.
    ///
    /// Returns `None` when the loop is not running.
    pub fn send(&self, event: SessionEvent) -> Option<Reply> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx.send(Msg::Send(event, reply_tx)).ok()?;
        reply_rx.recv().ok()
    }
}

/// Simulated message source for exercising a watcher without Win32.
pub struct Simulator {
    tx: Sender<Msg>,
    rx: Receiver<Msg>,
    fail_at: Option<Stage>,
    gate: Option<Receiver<()>>,
    journal: Journal,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// A simulator whose setup succeeds.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            fail_at: None,
            gate: None,
            journal: Journal::default(),
        }
    }

    /// Make setup fail at `stage`.
    pub fn failing_at(mut self, stage: Stage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// Hold setup until `gate` receives a value or disconnects.
    pub fn stalled_until(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Handle for injecting messages.
    pub fn injector(&self) -> Injector {
        Injector {
            tx: self.tx.clone(),
        }
    }

    /// Handle for inspecting the listener's lifecycle.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

/// Simulated native resources, released in reverse order on drop.
struct Registration {
    class: String,
    journal: Journal,
    window: bool,
    subscribed: bool,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.subscribed {
            self.journal.record(Step::Unsubscribe);
        }
        if self.window {
            self.journal.record(Step::DestroyWindow);
        }
        classes().lock().remove(&self.class);
        self.journal.record(Step::UnregisterClass);
    }
}

impl Backend for Simulator {
    fn run(self, ctx: ListenerCtx<'_>) {
        let Self {
            tx,
            rx,
            fail_at,
            gate,
            journal,
        } = self;
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        if fail_at == Some(Stage::RegisterClass) {
            return ctx.fail(Error::ClassRegistration("simulated failure".into()));
        }
        if !classes().lock().insert(ctx.class_name.to_string()) {
            return ctx.fail(Error::ClassRegistration(format!(
                "class {} already registered",
                ctx.class_name
            )));
        }
        *journal.class.lock() = Some(ctx.class_name.to_string());
        journal.record(Step::RegisterClass);
        let mut reg = Registration {
            class: ctx.class_name.to_string(),
            journal: journal.clone(),
            window: false,
            subscribed: false,
        };

        if fail_at == Some(Stage::CreateWindow) {
            return ctx.fail(Error::WindowCreation("simulated failure".into()));
        }
        reg.window = true;
        journal.record(Step::CreateWindow);

        if fail_at == Some(Stage::Subscribe) {
            return ctx.fail(Error::Subscription("simulated failure".into()));
        }
        reg.subscribed = true;
        journal.record(Step::Subscribe);

        ctx.ctrl.set_quit(Box::new(move || {
            tx.send(Msg::Quit)
                .map_err(|_| Error::PostQuit("simulated queue closed".into()))
        }));
        ctx.ready();

        if !ctx.ctrl.stop_requested() {
            journal.record(Step::Pump);
            for msg in rx.iter() {
                match msg {
                    Msg::Quit => break,
                    Msg::Post(event) => {
                        route(event, |ev| ctx.sink.push(ev));
                    }
                    Msg::Send(event, reply) => {
                        let r = route(event, |ev| ctx.sink.push(ev));
                        let _ = reply.send(r);
                    }
                }
            }
        }
        debug!(class = ctx.class_name, "simulated_loop_exited");
        drop(reg);
    }
}
