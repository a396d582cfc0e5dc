//! Line-oriented decoder for the `text/event-stream` wire format.

use tokio_util::bytes::Buf;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

/// An error produced while decoding an event stream.
#[derive(Debug, thiserror::Error)]
pub enum SseCodecError {
    /// A line was not valid utf8.
    #[error("a line was not valid utf8")]
    InvalidUtf8(#[source] std::str::Utf8Error),

    /// The underlying reader failed.
    #[error("an I/O error occured")]
    Io(#[from] std::io::Error),
}

/// A single dispatched event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The event type, if the server named one.
    pub event: Option<String>,

    /// The data buffer, `None` if no data line was seen.
    pub data: Option<String>,

    /// The last event id carried by this event.
    pub id: Option<String>,

    /// The reconnection time in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Whether this is a default `message` event, i.e. unnamed or explicitly named `message`.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Decodes a byte stream into [`SseEvent`]s.
#[derive(Debug, Default)]
pub struct SseCodec {
    // Set when the last line ended in \r, so a following \n belongs to it.
    last_newline_cr: bool,

    pending: SseEvent,
}

impl SseCodec {
    /// Make a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_field(&mut self, field: &str, value: &str) {
        match field {
            "event" => {
                self.pending.event = Some(value.into());
            }
            "data" => {
                let data = self.pending.data.get_or_insert_with(String::new);
                data.push_str(value);
                data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.pending.id = Some(value.into());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(value) = value.parse() {
                        self.pending.retry = Some(value);
                    }
                }
            }
            _ => {}
        }
    }

    fn take_pending(&mut self) -> SseEvent {
        let mut event = std::mem::take(&mut self.pending);
        if let Some(data) = event.data.as_mut() {
            if data.ends_with('\n') {
                data.pop();
            }
        }
        event
    }
}

/// Split a non-empty line into its field name and value.
///
/// Returns `None` for comment lines.
fn split_field(line: &str) -> Option<(&str, &str)> {
    match line.find(':') {
        Some(0) => None,
        Some(index) => {
            let (field, value) = line.split_at(index);
            let value = &value[1..];
            Some((field, value.strip_prefix(' ').unwrap_or(value)))
        }
        None => Some((line, "")),
    }
}

impl Decoder for SseCodec {
    type Item = SseEvent;
    type Error = SseCodecError;

    fn decode(&mut self, bytes: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if bytes.is_empty() {
                return Ok(None);
            }

            // The \n of a \r\n pair may arrive in a later read.
            if self.last_newline_cr && bytes[0] == b'\n' {
                bytes.advance(1);
                self.last_newline_cr = false;
                continue;
            }

            let Some(newline_index) = bytes.iter().position(|b| *b == b'\r' || *b == b'\n') else {
                return Ok(None);
            };
            self.last_newline_cr = bytes[newline_index] == b'\r';

            let line =
                std::str::from_utf8(&bytes[..newline_index]).map_err(SseCodecError::InvalidUtf8)?;

            if line.is_empty() {
                bytes.advance(1);
                if self.last_newline_cr && bytes.first() == Some(&b'\n') {
                    bytes.advance(1);
                    self.last_newline_cr = false;
                }
                return Ok(Some(self.take_pending()));
            }

            if let Some((field, value)) = split_field(line) {
                self.apply_field(field, value);
            }

            bytes.advance(newline_index + 1);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // An event without its terminating blank line is discarded.
        self.decode(buf)
    }
}
