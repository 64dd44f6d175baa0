//! Commands launched in response to session events.
//!
//! Every hook sees the event through `SESSION_WATCH_*` environment
//! variables. Plain hooks run as children of `dumpsessions`; hooks marked
//! `as_user` are started inside the affected user session instead.

use std::{fmt, str::FromStr};

use session_watch::{Message, SessionChange, SessionEvent};
use tokio::process::Command;
#[cfg(windows)]
use tokio::task;
use tracing::{info, warn};

#[cfg(windows)]
use crate::as_user;

/// An occasion a hook can fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Once, right after the watcher has started.
    Start,
    /// `WM_QUERYENDSESSION`.
    QueryEndSession,
    /// A specific session change.
    Change(SessionChange),
}

/// Name accepted for [`Trigger::Start`].
const START: &str = "start";
/// Name accepted for [`Trigger::QueryEndSession`].
const QUERY_END_SESSION: &str = "query-end-session";

impl Trigger {
    /// Whether `event` fires this trigger. [`Trigger::Start`] never matches
    /// an event.
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            Self::Start => false,
            Self::QueryEndSession => event.message() == Some(Message::QueryEndSession),
            Self::Change(change) => event.change() == Some(*change),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str(START),
            Self::QueryEndSession => f.write_str(QUERY_END_SESSION),
            Self::Change(c) => write!(f, "{c}"),
        }
    }
}

impl FromStr for Trigger {
    type Err = session_watch::ParseSessionChangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case(START) {
            return Ok(Self::Start);
        }
        if name.eq_ignore_ascii_case(QUERY_END_SESSION) {
            return Ok(Self::QueryEndSession);
        }
        s.parse().map(Self::Change)
    }
}

/// Environment describing `event` to a hook; `None` means the start trigger.
pub fn hook_env(event: Option<&SessionEvent>) -> Vec<(&'static str, String)> {
    let Some(event) = event else {
        return vec![("SESSION_WATCH_TRIGGER", START.to_string())];
    };
    let trigger = match (event.message(), event.change()) {
        (_, Some(change)) => change.to_string(),
        (Some(Message::QueryEndSession), _) => QUERY_END_SESSION.to_string(),
        _ => String::new(),
    };
    let mut env = vec![
        ("SESSION_WATCH_TRIGGER", trigger),
        ("SESSION_WATCH_MESSAGE", event.kind.to_string()),
        ("SESSION_WATCH_WPARAM", event.wparam.to_string()),
        ("SESSION_WATCH_LPARAM", event.lparam.to_string()),
    ];
    if let Some(change) = event.change() {
        env.push(("SESSION_WATCH_CHANGE", change.to_string()));
    }
    if let Some(id) = event.session_id() {
        env.push(("SESSION_WATCH_SESSION", id.to_string()));
    }
    env
}

/// A command run whenever one of its triggers fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    /// Occasions that fire the hook.
    triggers: Vec<Trigger>,
    /// Program to launch.
    program: String,
    /// Arguments passed to `program`.
    args: Vec<String>,
    /// Launch inside the user session rather than as a child.
    as_user: bool,
}

impl Hook {
    /// Build a hook; `None` when `command` is empty.
    pub fn new(triggers: Vec<Trigger>, command: Vec<String>, as_user: bool) -> Option<Self> {
        let mut it = command.into_iter();
        let program = it.next()?;
        Some(Self {
            triggers,
            program,
            args: it.collect(),
            as_user,
        })
    }

    /// The program this hook launches.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the hook launches inside the user session.
    pub fn as_user(&self) -> bool {
        self.as_user
    }

    /// Whether any trigger matches `event`.
    pub fn matches(&self, event: &SessionEvent) -> bool {
        self.triggers.iter().any(|t| t.matches(event))
    }

    /// Whether the hook runs once at startup.
    pub fn on_start(&self) -> bool {
        self.triggers.contains(&Trigger::Start)
    }

    /// Build the child-process command for `event`.
    pub fn command(&self, event: Option<&SessionEvent>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(hook_env(event));
        cmd
    }

    /// Launch the hook for `event` (`None` for the start trigger) and reap
    /// it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fire(&self, event: Option<&SessionEvent>) {
        if self.as_user {
            self.fire_as_user(event);
            return;
        }
        match self.command(event).spawn() {
            Ok(mut child) => {
                info!(program = %self.program, pid = ?child.id(), "hook_spawned");
                let program = self.program.clone();
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => {}
                        Ok(status) => warn!(%program, %status, "hook_failed"),
                        Err(e) => warn!(%program, error = %e, "hook_wait_failed"),
                    }
                });
            }
            Err(e) => warn!(program = %self.program, error = %e, "hook_spawn_failed"),
        }
    }

    /// Start the hook in the event's session, or in every active session
    /// for events without one.
    #[cfg(windows)]
    fn fire_as_user(&self, event: Option<&SessionEvent>) {
        let program = self.program.clone();
        let args = self.args.clone();
        let env = hook_env(event);
        let session = event.and_then(SessionEvent::session_id);
        task::spawn_blocking(move || {
            if let Err(e) = as_user::spawn_in_sessions(&program, &args, &env, session) {
                warn!(error = %e, "hook_as_user_failed");
            }
        });
    }

    /// Settings validation rejects `as_user` hooks off Windows.
    #[cfg(not(windows))]
    fn fire_as_user(&self, _event: Option<&SessionEvent>) {
        warn!(program = %self.program, "hook_as_user_unsupported");
    }
}

/// Fire every hook that matches `event`; returns how many fired.
pub fn fire_matching(hooks: &[Hook], event: &SessionEvent) -> usize {
    let mut n = 0;
    for hook in hooks.iter().filter(|h| h.matches(event)) {
        hook.fire(Some(event));
        n += 1;
    }
    n
}

/// Fire every hook with the start trigger; returns how many fired.
pub fn fire_start(hooks: &[Hook]) -> usize {
    let mut n = 0;
    for hook in hooks.iter().filter(|h| h.on_start()) {
        hook.fire(None);
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(on: &[&str]) -> Hook {
        let triggers = on.iter().map(|s| s.parse::<Trigger>().unwrap()).collect();
        Hook::new(triggers, vec!["prog".into(), "--flag".into()], false).unwrap()
    }

    fn envs(cmd: &Command) -> Vec<(String, String)> {
        cmd.as_std()
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect()
    }

    #[test]
    fn triggers_parse_and_display() {
        assert_eq!("start".parse::<Trigger>(), Ok(Trigger::Start));
        assert_eq!(
            "query-end-session".parse::<Trigger>(),
            Ok(Trigger::QueryEndSession)
        );
        assert_eq!(
            "Unlock".parse::<Trigger>(),
            Ok(Trigger::Change(SessionChange::Unlock))
        );
        assert!("shutdown".parse::<Trigger>().is_err());
        assert_eq!(Trigger::Change(SessionChange::Logon).to_string(), "logon");
        assert_eq!(Trigger::Start.to_string(), "start");
    }

    #[test]
    fn hooks_match_only_their_events() {
        let h = hook(&["logon", "unlock"]);
        assert!(h.matches(&SessionEvent::session_change(SessionChange::Unlock, 2)));
        assert!(h.matches(&SessionEvent::session_change(SessionChange::Logon, 2)));
        assert!(!h.matches(&SessionEvent::session_change(SessionChange::Lock, 2)));
        assert!(!h.matches(&SessionEvent::query_end_session(0)));
        assert!(!h.on_start());

        let q = hook(&["query-end-session"]);
        assert!(q.matches(&SessionEvent::query_end_session(1)));
        assert!(!q.matches(&SessionEvent::session_change(SessionChange::Logoff, 1)));
    }

    #[test]
    fn start_trigger_matches_no_event() {
        let h = hook(&["start"]);
        assert!(h.on_start());
        assert!(!h.matches(&SessionEvent::query_end_session(0)));
        assert!(!h.matches(&SessionEvent::session_change(SessionChange::Logon, 1)));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(Hook::new(vec![Trigger::QueryEndSession], vec![], false).is_none());
    }

    #[test]
    fn command_carries_event_environment() {
        let h = hook(&["lock"]);
        let cmd = h.command(Some(&SessionEvent::session_change(SessionChange::Lock, 3)));
        assert_eq!(cmd.as_std().get_program(), "prog");
        let envs = envs(&cmd);
        assert!(envs.contains(&("SESSION_WATCH_TRIGGER".into(), "lock".into())));
        assert!(envs.contains(&("SESSION_WATCH_CHANGE".into(), "lock".into())));
        assert!(envs.contains(&("SESSION_WATCH_SESSION".into(), "3".into())));
    }

    #[test]
    fn start_and_shutdown_environments() {
        assert_eq!(
            hook_env(None),
            vec![("SESSION_WATCH_TRIGGER", "start".to_string())]
        );
        let env = hook_env(Some(&SessionEvent::query_end_session(1)));
        assert!(env.contains(&("SESSION_WATCH_TRIGGER", "query-end-session".to_string())));
        assert!(!env.iter().any(|(k, _)| *k == "SESSION_WATCH_SESSION"));
    }
}
