//! session-watch: observe Windows session changes and shutdown queries.
//!
//! A [`SessionWatcher`] owns a dedicated listener thread that registers a
//! hidden message-only window, subscribes it to session notifications for
//! every session on the machine, and pumps its message loop. Two message
//! families are forwarded:
//! - `WM_WTSSESSION_CHANGE`: logon, logoff, lock, unlock, console and remote
//!   connect/disconnect, session create/terminate.
//! - `WM_QUERYENDSESSION`: the machine is about to shut down or log off.
//!
//! Each forwarded message becomes a [`SessionEvent`] that is queued for a
//! relay worker thread, which calls the host's [`Relay`] in delivery order.
//! The watcher only observes: shutdown queries always receive default OS
//! handling.
//!
//! Lifecycle:
//! - [`SessionWatcher::start`] returns once native setup has succeeded, or
//!   with the [`Error`] that stopped it.
//! - [`SessionWatcher::stop`] asks the loop to quit, lets it release the
//!   subscription, window and class in that order, and joins both threads
//!   with a bounded wait. Dropping the handle does the same.
//!
//! Tests and downstream crates can drive the same lifecycle without Win32
//! through the simulated backend in [`sim`] (feature `test-utils`).
#![warn(unsafe_op_in_unsafe_fn)]
#![cfg_attr(not(any(windows, feature = "test-utils")), allow(dead_code))]

mod config;
mod error;
mod event;
mod relay;
/// Routing decisions for the hidden window's procedure.
mod route;
/// Native and simulated message sources.
mod sys;
mod watcher;

pub use config::{
    DEFAULT_CLASS_PREFIX, DEFAULT_QUEUE_CAPACITY, DEFAULT_READY_TIMEOUT, DEFAULT_STOP_TIMEOUT,
    WatcherConfig,
};
pub use error::{Error, Result};
pub use event::{Message, ParseSessionChangeError, SessionChange, SessionEvent, codes};
pub use relay::{Exit, Relay};
pub use route::{Reply, route};
#[cfg(any(test, feature = "test-utils"))]
pub use sys::sim;
pub use watcher::{SessionWatcher, StopOutcome, WatcherId, WatcherState};
