//! One-line renderings of session events.

use serde::Serialize;
use session_watch::{Message, SessionChange, SessionEvent};

/// Output style selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// One JSON object per line.
    Json,
}

/// JSON shape of an event.
#[derive(Debug, Serialize)]
struct Record {
    /// Raw message kind.
    kind: u32,
    /// Decoded message family.
    message: Option<Message>,
    /// Decoded session change.
    change: Option<SessionChange>,
    /// Affected session id.
    session: Option<u32>,
    /// Raw first parameter.
    wparam: usize,
    /// Raw second parameter.
    lparam: isize,
}

/// Render `event` as a single line without a trailing newline.
pub fn render(event: &SessionEvent, format: Format) -> String {
    match format {
        Format::Text => event.to_string(),
        Format::Json => {
            let record = Record {
                kind: event.kind,
                message: event.message(),
                change: event.change(),
                session: event.session_id(),
                wparam: event.wparam,
                lparam: event.lparam,
            };
            serde_json::to_string(&record)
                .unwrap_or_else(|e| format!("{{\"error\":{:?}}}", e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn text_uses_event_display() {
        let ev = SessionEvent::session_change(SessionChange::Unlock, 4);
        assert_eq!(render(&ev, Format::Text), "session 4 unlock");
    }

    #[test]
    fn json_includes_decoded_and_raw_fields() {
        let ev = SessionEvent::session_change(SessionChange::RemoteConnect, 2);
        let v: Value = serde_json::from_str(&render(&ev, Format::Json)).unwrap();
        assert_eq!(
            v,
            json!({
                "kind": 0x02B1,
                "message": "session-change",
                "change": "remote-connect",
                "session": 2,
                "wparam": 3,
                "lparam": 2,
            })
        );
    }

    #[test]
    fn json_for_shutdown_query_has_no_session() {
        let ev = SessionEvent::query_end_session(1);
        let v: Value = serde_json::from_str(&render(&ev, Format::Json)).unwrap();
        assert_eq!(v["message"], "query-end-session");
        assert!(v["change"].is_null());
        assert!(v["session"].is_null());
    }
}
