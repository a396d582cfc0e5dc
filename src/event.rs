//! Lifecycle events delivered by a transport.

use serde::Serialize;

/// Log event tags.
pub mod tag {
    /// A connection attempt is about to be made.
    pub const PUSH_API_CONNECT: &str = "PUSH_API_CONNECT";
    /// The server accepted the stream.
    pub const PUSH_API_CONNECTION_OPEN: &str = "PUSH_API_CONNECTION_OPEN";
    /// The client was stopped.
    pub const PUSH_API_DISCONNECT: &str = "PUSH_API_DISCONNECT";
    /// A message payload arrived.
    pub const PUSH_EVENT_RECEIVED: &str = "PUSH_EVENT_RECEIVED";
    /// A message payload was a non-empty array.
    pub const NOTIFICATIONS_RECEIVED: &str = "NOTIFICATIONS_RECEIVED";
    /// A message payload was an empty array.
    pub const EMPTY_DATA: &str = "EMPTY_DATA";
    /// The transport reported an error.
    pub const PUSH_EVENT_ERROR: &str = "PUSH_EVENT_ERROR";
    /// A message payload was not valid JSON.
    pub const PAYLOAD_PARSE_ERROR: &str = "PAYLOAD_PARSE_ERROR";
}

/// Error kind recorded for every transport failure.
pub const EVENT_SOURCE_ERROR: &str = "EVENT_SOURCE_ERROR";

/// A connection lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The connection was established.
    Opened,
    /// A message arrived; the raw data field.
    Message(String),
    /// The transport failed.
    Error(ErrorRecord),
}

/// A transport failure, flattened for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Error tag, [`EVENT_SOURCE_ERROR`] for transport failures.
    #[serde(skip)]
    pub kind: String,
    /// The error's display text.
    pub message: String,
    /// Every newline collapsed to `"; "`.
    pub stack: String,
    /// HTTP status, when the failure came with one.
    pub status: Option<u16>,
}

impl ErrorRecord {
    /// Build a record of kind [`EVENT_SOURCE_ERROR`].
    pub fn new(message: impl Into<String>, stack: Option<&str>, status: Option<u16>) -> Self {
        Self {
            kind: EVENT_SOURCE_ERROR.to_string(),
            message: message.into(),
            stack: stack.map(flatten_stack).unwrap_or_default(),
            status,
        }
    }

    /// Build a record from an error and its `source()` chain.
    ///
    /// The chain stands in for a stack trace, one cause per line.
    pub fn from_error(error: &(dyn std::error::Error + 'static), status: Option<u16>) -> Self {
        let mut stack = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(error.to_string(), Some(&stack), status)
    }

    /// The record rendered as a JSON object of message, stack and status.
    pub fn detail(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

fn flatten_stack(stack: &str) -> String {
    stack.replace("\r\n", "\n").replace('\n', "; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_newlines_are_collapsed() {
        let record = ErrorRecord::new("boom", Some("line1\nline2"), Some(500));
        assert_eq!(record.kind, EVENT_SOURCE_ERROR);
        assert_eq!(record.stack, "line1; line2");
        assert_eq!(
            record.detail(),
            r#"{"message":"boom","stack":"line1; line2","status":500}"#
        );
    }

    #[test]
    fn missing_status_and_stack() {
        let record = ErrorRecord::new("boom", None, None);
        assert_eq!(record.stack, "");
        assert_eq!(
            record.detail(),
            r#"{"message":"boom","stack":"","status":null}"#
        );
    }

    #[test]
    fn source_chain_becomes_stack() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let outer = crate::codec::SseCodecError::from(inner);
        let record = ErrorRecord::from_error(&outer, None);

        assert_eq!(record.message, "an I/O error occured");
        assert_eq!(record.stack, "an I/O error occured; caused by: reset by peer");
    }
}
