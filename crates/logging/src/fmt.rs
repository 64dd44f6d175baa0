//! Render `tracing` events into concise logfmt strings.
//!
//! [`render_event`] extracts level, target, and message from a
//! `tracing::Event`, rendering the remaining fields in `key=value` form.
//! [`LogfmtLayer`] applies it to every event and hands the result to a
//! caller-supplied sink, which is how the command-line tools print their
//! logs.

use std::fmt::{self, Debug, Display, Write};

use tracing::{
    Event, Metadata, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::layer::{Context, Layer};

/// Rendered fields extracted from a tracing Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLog {
    /// Severity level (e.g., INFO, WARN) for the event.
    pub level: String,
    /// Event target (typically the module path).
    pub target: String,
    /// Human‑readable message or rendered `key=value` pairs.
    pub message: String,
    /// Non-message fields rendered as `key=value`, when a message exists.
    pub fields: String,
}

impl Display for RenderedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level={} target={} msg={:?}",
            self.level, self.target, self.message
        )?;
        if !self.fields.is_empty() {
            write!(f, " {}", self.fields)?;
        }
        Ok(())
    }
}

/// Extract a concise record from a tracing Event.
///
/// Behavior:
/// - If the event contains a `message` field, use it and keep the other
///   fields in [`RenderedLog::fields`].
/// - Otherwise, the `key=value` pairs become the message.
pub fn render_event(event: &Event<'_>) -> RenderedLog {
    /// Collects the message and remaining fields of one event.
    struct MsgVisitor {
        /// Captured `message` field, if present.
        msg: Option<String>,
        /// Accumulated non‑message fields rendered as `key=value`.
        fields: String,
    }
    impl Visit for MsgVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                self.msg = Some(value.to_string());
            } else {
                let _ignored = write!(&mut self.fields, "{}=\"{}\" ", field.name(), value);
            }
        }
        fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
            if field.name() == "message" {
                self.msg = Some(format!("{:?}", value));
            } else {
                let _ignored = write!(&mut self.fields, "{}={:?} ", field.name(), value);
            }
        }
    }
    let meta: &Metadata<'_> = event.metadata();
    let mut vis = MsgVisitor {
        msg: None,
        fields: String::new(),
    };
    event.record(&mut vis);
    let fields = vis.fields.trim_end().to_string();
    let (message, fields) = match vis.msg {
        Some(m) => (m, fields),
        None => (fields, String::new()),
    };
    RenderedLog {
        level: meta.level().to_string(),
        target: meta.target().to_string(),
        message,
        fields,
    }
}

/// Tracing layer that renders each event and passes it to a sink.
pub struct LogfmtLayer<F> {
    /// Receives every rendered event.
    sink: F,
}

impl<S, F> Layer<S> for LogfmtLayer<F>
where
    S: Subscriber,
    F: Fn(RenderedLog) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        (self.sink)(render_event(event));
    }
}

/// Create a layer that hands every rendered event to `sink`.
pub fn layer<F>(sink: F) -> LogfmtLayer<F>
where
    F: Fn(RenderedLog) + Send + Sync + 'static,
{
    LogfmtLayer { sink }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::info;
    use tracing_subscriber::prelude::*;

    use super::*;

    #[test]
    fn renders_message_and_fields() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let subscriber = tracing_subscriber::registry().with(layer(move |r| {
            s.lock().unwrap().push(r);
        }));
        tracing::subscriber::with_default(subscriber, || {
            info!(target: "logfmt_test", id = 3, class = "Watch-1", "session_watcher_started");
            info!(target: "logfmt_test", count = 2);
        });
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].level, "INFO");
        assert_eq!(seen[0].message, "session_watcher_started");
        assert_eq!(seen[0].fields, "id=3 class=\"Watch-1\"");
        assert_eq!(
            seen[0].to_string(),
            "level=INFO target=logfmt_test msg=\"session_watcher_started\" id=3 class=\"Watch-1\""
        );
        assert_eq!(seen[1].message, "count=2");
        assert!(seen[1].fields.is_empty());
    }
}
