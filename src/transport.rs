//! Sources of [`StreamEvent`]s.
//!
//! [`HttpTransport`] speaks the event-stream protocol over HTTP and takes care
//! of reconnection itself; anything else implementing [`Transport`] can stand
//! in for it, which is how the client is tested without a network.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{Stream, TryStreamExt};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::codec::{SseCodec, SseCodecError};
use crate::config::ConnectionConfig;
use crate::event::{ErrorRecord, StreamEvent};

/// A boxed stream of lifecycle events. Dropping it closes the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Opens event streams.
pub trait Transport {
    /// Start connecting to `config.url()`. Must not block; connection happens as the stream is polled
    /// or in the background.
    fn connect(&self, config: &ConnectionConfig) -> EventStream;
}

/// Reconnection delay used until the server sends a `retry` field.
pub const DEFAULT_RETRY: Duration = Duration::from_millis(1000);

const LAST_EVENT_ID: &str = "Last-Event-ID";

/// A transport failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read.
    #[error("request failed")]
    Request(#[from] reqwest::Error),

    /// The server answered with something other than 200.
    #[error("Non-200 status code ({0})")]
    Status(StatusCode),

    /// The body was not a valid event stream.
    #[error("invalid event stream")]
    Decode(#[from] SseCodecError),

    /// The server ended the response body.
    #[error("connection closed by server")]
    Closed,

    /// The header value could not be sent.
    #[error("invalid authorization header")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl TransportError {
    /// The HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(status) => Some(status.as_u16()),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a new connection attempt should follow this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status(status) => matches!(status.as_u16(), 500 | 502 | 503 | 504),
            Self::Request(e) => !e.is_builder(),
            Self::InvalidHeader(_) => false,
            _ => true,
        }
    }
}

impl From<&TransportError> for ErrorRecord {
    fn from(error: &TransportError) -> Self {
        ErrorRecord::from_error(error, error.status())
    }
}

/// Event-stream transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    retry: Duration,
    channel_capacity: usize,
}

impl HttpTransport {
    /// Create a transport with a default reqwest client.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            retry: DEFAULT_RETRY,
            channel_capacity: 64,
        }
    }

    /// Set the initial reconnection delay.
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn connect(&self, config: &ConnectionConfig) -> EventStream {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let token = CancellationToken::new();

        let session = Session {
            client: self.client.clone(),
            config: config.clone(),
            retry: self.retry,
            last_event_id: None,
            events: tx,
        };
        tokio::spawn(session.run(token.clone()));

        Box::pin(HttpEventStream {
            events: ReceiverStream::new(rx),
            _cancel: token.drop_guard(),
        })
    }
}

/// Receiving half of a running session; cancels it when dropped.
struct HttpEventStream {
    events: ReceiverStream<StreamEvent>,
    _cancel: DropGuard,
}

impl Stream for HttpEventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// Reconnection state of one logical stream.
struct Session {
    client: reqwest::Client,
    config: ConnectionConfig,
    retry: Duration,
    last_event_id: Option<String>,
    events: mpsc::Sender<StreamEvent>,
}

impl Session {
    async fn run(mut self, token: CancellationToken) {
        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = self.connect_once() => result,
            };

            // Ok only if the receiver went away.
            let Err(error) = result else {
                return;
            };
            let retryable = error.is_retryable();
            if !self.emit(StreamEvent::Error(ErrorRecord::from(&error))).await || !retryable {
                debug!(error = %error, "event stream closed");
                return;
            }

            trace!(delay_ms = self.retry.as_millis() as u64, "reconnecting");
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.retry) => {}
            }
        }
    }

    /// Run one HTTP request to completion.
    ///
    /// Returns `Ok(())` when the receiver is gone, otherwise the error that ended the attempt.
    async fn connect_once(&mut self) -> Result<(), TransportError> {
        let mut request = self
            .client
            .get(self.config.url())
            .header(AUTHORIZATION, HeaderValue::from_str(self.config.authorization())?)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = self.last_event_id.as_deref() {
            request = request.header(LAST_EVENT_ID, HeaderValue::from_str(id)?);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status()));
        }

        if !self.emit(StreamEvent::Opened).await {
            return Ok(());
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = FramedRead::new(StreamReader::new(body), SseCodec::new());

        while let Some(event) = reader.next().await {
            let event = event?;

            // An empty id resets the last event id.
            if let Some(id) = event.id.as_ref() {
                self.last_event_id = (!id.is_empty()).then(|| id.clone());
            }
            if let Some(retry) = event.retry {
                self.retry = Duration::from_millis(retry);
            }

            if !event.is_message() {
                trace!(event = ?event.event, "skipping named event");
                continue;
            }
            let Some(data) = event.data else {
                continue;
            };
            if !self.emit(StreamEvent::Message(data)).await {
                return Ok(());
            }
        }

        Err(TransportError::Closed)
    }

    async fn emit(&self, event: StreamEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}
