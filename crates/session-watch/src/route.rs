use crate::event::{Message, SessionEvent};

/// What the window procedure hands back to the OS for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Defer to default OS handling (`DefWindowProcW`).
    Default,
    /// The message was consumed; answer zero.
    Handled,
}

/// Decide how the hidden window handles a message.
///
/// - Query-end-session is forwarded, then left to default handling, so the
///   watcher never vetoes a shutdown.
/// - Session changes are forwarded and answered with zero.
/// - Everything else is left to default handling and never forwarded.
pub fn route(event: SessionEvent, mut forward: impl FnMut(SessionEvent)) -> Reply {
    match event.message() {
        Some(Message::QueryEndSession) => {
            forward(event);
            Reply::Default
        }
        Some(Message::SessionChange) => {
            forward(event);
            Reply::Handled
        }
        None => Reply::Default,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::event::codes;

    fn routed(event: SessionEvent) -> (Reply, Vec<SessionEvent>) {
        let mut seen = Vec::new();
        let reply = route(event, |e| seen.push(e));
        (reply, seen)
    }

    #[test]
    fn session_change_is_forwarded_and_handled() {
        let ev = SessionEvent::new(codes::WM_WTSSESSION_CHANGE, codes::WTS_SESSION_LOCK, 3);
        let (reply, seen) = routed(ev);
        assert_eq!(reply, Reply::Handled);
        assert_eq!(seen, vec![ev]);
    }

    #[test]
    fn unrelated_messages_fall_through() {
        // WM_CREATE, WM_DESTROY, WM_TIMER
        for kind in [0x0001, 0x0002, 0x0113] {
            let (reply, seen) = routed(SessionEvent::new(kind, 7, 9));
            assert_eq!(reply, Reply::Default);
            assert!(seen.is_empty());
        }
    }

    proptest! {
        #[test]
        fn query_end_session_never_vetoes(wparam in any::<usize>(), lparam in any::<isize>()) {
            let ev = SessionEvent::new(codes::WM_QUERYENDSESSION, wparam, lparam);
            let (reply, seen) = routed(ev);
            prop_assert_eq!(reply, Reply::Default);
            prop_assert_eq!(seen, vec![ev]);
        }
    }
}
