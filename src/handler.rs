//! Dispatch of lifecycle events.

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::event::{tag, StreamEvent};

/// Receives every event from a running client.
pub trait EventHandler: Send + Sync + 'static {
    /// Called once per event, in arrival order, from the client's dispatch task.
    fn handle(&self, event: StreamEvent);
}

/// What [`LoggingHandler::dispatch`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The connection-open line was logged.
    Opened,
    /// The payload was an empty array.
    EmptyData,
    /// The payload parsed; `items` is its array length, or 1 for a non-array value.
    Received { items: usize },
    /// The payload was not JSON and was skipped.
    Unparseable,
    /// A transport error of the given kind was logged.
    Errored(String),
}

/// Logs each lifecycle event as a key=value line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    /// Log `event` and report what was done with it.
    pub fn dispatch(&self, event: &StreamEvent) -> Handled {
        match event {
            StreamEvent::Opened => {
                info!(event = %tag::PUSH_API_CONNECTION_OPEN);
                Handled::Opened
            }
            StreamEvent::Message(data) => on_message(data),
            StreamEvent::Error(record) => {
                error!(
                    event = %tag::PUSH_EVENT_ERROR,
                    error = %record.kind,
                    detail = %record.detail()
                );
                Handled::Errored(record.kind.clone())
            }
        }
    }
}

impl EventHandler for LoggingHandler {
    fn handle(&self, event: StreamEvent) {
        self.dispatch(&event);
    }
}

fn on_message(data: &str) -> Handled {
    info!(event = %tag::PUSH_EVENT_RECEIVED, data = %single_line(data));

    let payload: Value = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(event = %tag::PAYLOAD_PARSE_ERROR, error = %e);
            return Handled::Unparseable;
        }
    };

    match payload {
        Value::Array(items) if items.is_empty() => {
            info!(event = %tag::EMPTY_DATA);
            Handled::EmptyData
        }
        Value::Array(items) => {
            debug!(event = %tag::NOTIFICATIONS_RECEIVED, items = items.len());
            Handled::Received { items: items.len() }
        }
        other => {
            debug!(kind = json_kind(&other), "payload is not an array");
            Handled::Received { items: 1 }
        }
    }
}

/// Escape line breaks so a multi-line `data` field stays on one log line.
fn single_line(data: &str) -> Cow<'_, str> {
    if data.contains(['\n', '\r']) {
        Cow::Owned(data.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(data)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorRecord;
    use crate::test_support::{capture_logs, capture_logs_at};
    use tracing::Level;

    fn lines(logs: &str) -> Vec<&str> {
        logs.lines().collect()
    }

    #[test]
    fn open_logs_one_line() {
        let (handled, logs) = capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Opened));

        assert_eq!(handled, Handled::Opened);
        assert_eq!(lines(&logs), vec!["INFO event=PUSH_API_CONNECTION_OPEN"]);
    }

    #[test]
    fn empty_array_logs_empty_data() {
        let (handled, logs) =
            capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Message("[]".into())));

        assert_eq!(handled, Handled::EmptyData);
        assert_eq!(
            lines(&logs),
            vec![
                "INFO event=PUSH_EVENT_RECEIVED data=[]",
                "INFO event=EMPTY_DATA",
            ]
        );
    }

    #[test]
    fn non_empty_array_is_received_only() {
        let (handled, logs) = capture_logs(|| {
            LoggingHandler.dispatch(&StreamEvent::Message(r#"[{"id":1}]"#.into()))
        });

        assert_eq!(handled, Handled::Received { items: 1 });
        assert_eq!(
            lines(&logs),
            vec![r#"INFO event=PUSH_EVENT_RECEIVED data=[{"id":1}]"#]
        );
    }

    #[test]
    fn non_empty_array_reports_item_count_at_debug() {
        let (_, logs) = capture_logs_at(Level::DEBUG, || {
            LoggingHandler.dispatch(&StreamEvent::Message(r#"[{"id":1},{"id":2}]"#.into()))
        });

        assert_eq!(
            lines(&logs)[1],
            "DEBUG event=NOTIFICATIONS_RECEIVED items=2"
        );
    }

    #[test]
    fn multi_line_payload_stays_on_one_line() {
        let (handled, logs) =
            capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Message("[\n1,\r\n2\n]".into())));

        assert_eq!(handled, Handled::Received { items: 2 });
        assert_eq!(
            lines(&logs),
            vec![r"INFO event=PUSH_EVENT_RECEIVED data=[\n1,\r\n2\n]"]
        );
    }

    #[test]
    fn non_array_payload_is_not_empty() {
        let (handled, logs) =
            capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Message(r#""""#.into())));

        assert_eq!(handled, Handled::Received { items: 1 });
        assert!(!logs.contains("EMPTY_DATA"));
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let (handled, logs) =
            capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Message("not json".into())));

        assert_eq!(handled, Handled::Unparseable);
        let lines = lines(&logs);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "INFO event=PUSH_EVENT_RECEIVED data=not json");
        assert!(lines[1].starts_with("WARN event=PAYLOAD_PARSE_ERROR error="));
    }

    #[test]
    fn transport_error_with_status() {
        let record = ErrorRecord::new("boom", Some("line1\nline2"), Some(500));
        let (handled, logs) =
            capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Error(record)));

        assert_eq!(handled, Handled::Errored("EVENT_SOURCE_ERROR".into()));
        assert_eq!(
            lines(&logs),
            vec![
                r#"ERROR event=PUSH_EVENT_ERROR error=EVENT_SOURCE_ERROR detail={"message":"boom","stack":"line1; line2","status":500}"#
            ]
        );
    }

    #[test]
    fn transport_error_without_status() {
        let record = ErrorRecord::new("boom", Some("line1"), None);
        let (_, logs) = capture_logs(|| LoggingHandler.dispatch(&StreamEvent::Error(record)));

        assert!(logs.contains(r#""status":null"#));
    }
}
