//! Event types emitted by the session watcher.
//!
//! A [`SessionEvent`] is the raw triple delivered by the OS to the hidden
//! window: the message kind plus its two parameter words. The helper views
//! ([`SessionEvent::message`], [`SessionEvent::change`],
//! [`SessionEvent::session_id`]) decode it without losing the raw values.

use std::{fmt, str::FromStr};

use serde::Serialize;

/// Raw Win32 message and status codes understood by the watcher.
pub mod codes {
    /// Sent to ask whether the session may end (shutdown or logoff).
    pub const WM_QUERYENDSESSION: u32 = 0x0011;
    /// Sent when any session's state changes.
    pub const WM_WTSSESSION_CHANGE: u32 = 0x02B1;

    /// A session was connected to the console terminal.
    pub const WTS_CONSOLE_CONNECT: usize = 0x1;
    /// A session was disconnected from the console terminal.
    pub const WTS_CONSOLE_DISCONNECT: usize = 0x2;
    /// A session was connected to a remote terminal.
    pub const WTS_REMOTE_CONNECT: usize = 0x3;
    /// A session was disconnected from a remote terminal.
    pub const WTS_REMOTE_DISCONNECT: usize = 0x4;
    /// A user logged on to a session.
    pub const WTS_SESSION_LOGON: usize = 0x5;
    /// A user logged off a session.
    pub const WTS_SESSION_LOGOFF: usize = 0x6;
    /// A session was locked.
    pub const WTS_SESSION_LOCK: usize = 0x7;
    /// A session was unlocked.
    pub const WTS_SESSION_UNLOCK: usize = 0x8;
    /// A session's remote control status changed.
    pub const WTS_SESSION_REMOTE_CONTROL: usize = 0x9;
    /// A session was created.
    pub const WTS_SESSION_CREATE: usize = 0xA;
    /// A session was terminated.
    pub const WTS_SESSION_TERMINATE: usize = 0xB;
}

/// The message families forwarded by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Message {
    /// `WM_QUERYENDSESSION`: the machine is asking whether it may shut down or log off.
    QueryEndSession,
    /// `WM_WTSSESSION_CHANGE`: a session changed state.
    SessionChange,
}

impl Message {
    /// Classify a raw message kind; `None` for anything the watcher ignores.
    pub fn from_kind(kind: u32) -> Option<Self> {
        match kind {
            codes::WM_QUERYENDSESSION => Some(Self::QueryEndSession),
            codes::WM_WTSSESSION_CHANGE => Some(Self::SessionChange),
            _ => None,
        }
    }
}

/// Decoded `WM_WTSSESSION_CHANGE` status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionChange {
    /// Connected to the console terminal.
    ConsoleConnect,
    /// Disconnected from the console terminal.
    ConsoleDisconnect,
    /// Connected to a remote terminal.
    RemoteConnect,
    /// Disconnected from a remote terminal.
    RemoteDisconnect,
    /// User logged on.
    Logon,
    /// User logged off.
    Logoff,
    /// Session locked.
    Lock,
    /// Session unlocked.
    Unlock,
    /// Remote control status changed.
    RemoteControl,
    /// Session created.
    Create,
    /// Session terminated.
    Terminate,
    /// A status code this crate does not know about.
    Unknown(usize),
}

/// All named session changes, in status-code order.
const NAMED: [SessionChange; 11] = [
    SessionChange::ConsoleConnect,
    SessionChange::ConsoleDisconnect,
    SessionChange::RemoteConnect,
    SessionChange::RemoteDisconnect,
    SessionChange::Logon,
    SessionChange::Logoff,
    SessionChange::Lock,
    SessionChange::Unlock,
    SessionChange::RemoteControl,
    SessionChange::Create,
    SessionChange::Terminate,
];

impl SessionChange {
    /// Decode a `WTS_*` status code.
    pub fn from_code(code: usize) -> Self {
        match code {
            codes::WTS_CONSOLE_CONNECT => Self::ConsoleConnect,
            codes::WTS_CONSOLE_DISCONNECT => Self::ConsoleDisconnect,
            codes::WTS_REMOTE_CONNECT => Self::RemoteConnect,
            codes::WTS_REMOTE_DISCONNECT => Self::RemoteDisconnect,
            codes::WTS_SESSION_LOGON => Self::Logon,
            codes::WTS_SESSION_LOGOFF => Self::Logoff,
            codes::WTS_SESSION_LOCK => Self::Lock,
            codes::WTS_SESSION_UNLOCK => Self::Unlock,
            codes::WTS_SESSION_REMOTE_CONTROL => Self::RemoteControl,
            codes::WTS_SESSION_CREATE => Self::Create,
            codes::WTS_SESSION_TERMINATE => Self::Terminate,
            other => Self::Unknown(other),
        }
    }

    /// The raw `WTS_*` status code.
    pub fn code(self) -> usize {
        match self {
            Self::ConsoleConnect => codes::WTS_CONSOLE_CONNECT,
            Self::ConsoleDisconnect => codes::WTS_CONSOLE_DISCONNECT,
            Self::RemoteConnect => codes::WTS_REMOTE_CONNECT,
            Self::RemoteDisconnect => codes::WTS_REMOTE_DISCONNECT,
            Self::Logon => codes::WTS_SESSION_LOGON,
            Self::Logoff => codes::WTS_SESSION_LOGOFF,
            Self::Lock => codes::WTS_SESSION_LOCK,
            Self::Unlock => codes::WTS_SESSION_UNLOCK,
            Self::RemoteControl => codes::WTS_SESSION_REMOTE_CONTROL,
            Self::Create => codes::WTS_SESSION_CREATE,
            Self::Terminate => codes::WTS_SESSION_TERMINATE,
            Self::Unknown(code) => code,
        }
    }

    /// Short kebab-case name, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::ConsoleConnect => "console-connect",
            Self::ConsoleDisconnect => "console-disconnect",
            Self::RemoteConnect => "remote-connect",
            Self::RemoteDisconnect => "remote-disconnect",
            Self::Logon => "logon",
            Self::Logoff => "logoff",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::RemoteControl => "remote-control",
            Self::Create => "create",
            Self::Terminate => "terminate",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for SessionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code:#x})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Returned when a name does not match any [`SessionChange`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session change: {0}")]
pub struct ParseSessionChangeError(pub String);

impl FromStr for SessionChange {
    type Err = ParseSessionChangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        NAMED
            .iter()
            .copied()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| ParseSessionChangeError(s.to_string()))
    }
}

/// A single session or shutdown notification as delivered by the OS.
///
/// `wparam` carries the coarse classification (a `WTS_*` status code for
/// session changes, zero for shutdown queries) and `lparam` the session id or
/// the end-session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionEvent {
    /// Raw message kind (`WM_*`).
    pub kind: u32,
    /// First parameter word.
    pub wparam: usize,
    /// Second parameter word.
    pub lparam: isize,
}

impl SessionEvent {
    /// Build an event from the raw triple.
    pub const fn new(kind: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            kind,
            wparam,
            lparam,
        }
    }

    /// A `WM_WTSSESSION_CHANGE` event for `session`.
    pub fn session_change(change: SessionChange, session: u32) -> Self {
        Self::new(codes::WM_WTSSESSION_CHANGE, change.code(), session as isize)
    }

    /// A `WM_QUERYENDSESSION` event with the given end-session flags.
    pub const fn query_end_session(flags: isize) -> Self {
        Self::new(codes::WM_QUERYENDSESSION, 0, flags)
    }

    /// The message family, if this is one the watcher forwards.
    pub fn message(&self) -> Option<Message> {
        Message::from_kind(self.kind)
    }

    /// The decoded session change, for `WM_WTSSESSION_CHANGE` events only.
    pub fn change(&self) -> Option<SessionChange> {
        match self.message() {
            Some(Message::SessionChange) => Some(SessionChange::from_code(self.wparam)),
            _ => None,
        }
    }

    /// The affected session id, for `WM_WTSSESSION_CHANGE` events only.
    pub fn session_id(&self) -> Option<u32> {
        match self.message() {
            Some(Message::SessionChange) => u32::try_from(self.lparam).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.message(), self.change(), self.session_id()) {
            (Some(Message::SessionChange), Some(change), Some(id)) => {
                write!(f, "session {id} {change}")
            }
            (Some(Message::QueryEndSession), _, _) => {
                write!(f, "query-end-session flags={:#x}", self.lparam)
            }
            _ => write!(
                f,
                "message {:#06x} wparam={:#x} lparam={:#x}",
                self.kind, self.wparam, self.lparam
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lock_for_session() {
        let ev = SessionEvent::new(codes::WM_WTSSESSION_CHANGE, codes::WTS_SESSION_LOCK, 3);
        assert_eq!(ev.message(), Some(Message::SessionChange));
        assert_eq!(ev.change(), Some(SessionChange::Lock));
        assert_eq!(ev.session_id(), Some(3));
        assert_eq!(ev.to_string(), "session 3 lock");
    }

    #[test]
    fn query_end_session_has_no_change() {
        let ev = SessionEvent::query_end_session(0);
        assert_eq!(ev.message(), Some(Message::QueryEndSession));
        assert_eq!(ev.change(), None);
        assert_eq!(ev.session_id(), None);
    }

    #[test]
    fn unknown_codes_keep_their_value() {
        let c = SessionChange::from_code(0x42);
        assert_eq!(c, SessionChange::Unknown(0x42));
        assert_eq!(c.code(), 0x42);
        assert_eq!(c.to_string(), "unknown(0x42)");
    }

    #[test]
    fn names_parse_back() {
        for c in NAMED {
            assert_eq!(c.name().parse::<SessionChange>(), Ok(c));
            assert_eq!(SessionChange::from_code(c.code()), c);
        }
        assert_eq!(
            "Remote_Connect".parse::<SessionChange>(),
            Ok(SessionChange::RemoteConnect)
        );
        assert!("unknown".parse::<SessionChange>().is_err());
    }

    #[test]
    fn other_messages_are_not_classified() {
        let ev = SessionEvent::new(0x0001, 0, 0);
        assert_eq!(ev.message(), None);
        assert_eq!(ev.change(), None);
    }
}
