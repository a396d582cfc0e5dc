//! The stream client: owns at most one live connection and feeds its events to a handler.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::event::tag;
use crate::handler::{EventHandler, LoggingHandler};
use crate::transport::{EventStream, Transport};

/// Client error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `start` was called while a connection is already live.
    #[error("stream client already started")]
    AlreadyStarted,
}

/// Whether the client holds a live stream handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream; the initial state and the state after `stop`.
    Disconnected,
    /// `start` succeeded and `stop` has not been called.
    Connected,
}

/// The live connection and the task draining it.
struct StreamHandle {
    task: JoinHandle<()>,
}

/// Client for a single authenticated event stream.
///
/// Transport errors are reported to the handler and do not change [`ConnectionState`];
/// reconnecting is the transport's job.
pub struct StreamClient<T, H = LoggingHandler> {
    config: ConnectionConfig,
    transport: T,
    handler: Arc<H>,
    handle: Option<StreamHandle>,
}

impl<T: Transport> StreamClient<T, LoggingHandler> {
    /// Create a client that logs every event.
    pub fn new(config: ConnectionConfig, transport: T) -> Self {
        Self::with_handler(config, transport, LoggingHandler)
    }
}

impl<T: Transport, H: EventHandler> StreamClient<T, H> {
    /// Create a client that hands every event to `handler`.
    pub fn with_handler(config: ConnectionConfig, transport: T, handler: H) -> Self {
        Self {
            config,
            transport,
            handler: Arc::new(handler),
            handle: None,
        }
    }

    /// The configuration this client connects with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.handle.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Open the stream and start dispatching its events.
    ///
    /// Returns as soon as the dispatch task is spawned. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyStarted`] if a connection is live; no new connection is made.
    pub fn start(&mut self) -> Result<(), ClientError> {
        if self.handle.is_some() {
            return Err(ClientError::AlreadyStarted);
        }

        info!(event = %tag::PUSH_API_CONNECT, url = %self.config.url());
        let stream = self.transport.connect(&self.config);
        let task = tokio::spawn(dispatch(stream, Arc::clone(&self.handler)));
        self.handle = Some(StreamHandle { task });

        Ok(())
    }

    /// Close the stream immediately.
    ///
    /// Returns `false` if there was nothing to close.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            debug!("stop called without a live connection");
            return false;
        };

        // Aborting drops the stream, which closes the connection.
        handle.task.abort();
        info!(event = %tag::PUSH_API_DISCONNECT, url = %self.config.url());
        true
    }

    /// Wait until the transport ends the stream for good.
    ///
    /// Resolves immediately when not connected. The client stays `Connected` until [`stop`](Self::stop).
    pub async fn finished(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if handle.task.is_finished() {
                return;
            }
            let _ = (&mut handle.task).await;
        }
    }
}

impl<T, H> Drop for StreamClient<T, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.task.abort();
        }
    }
}

async fn dispatch<H: EventHandler>(mut stream: EventStream, handler: Arc<H>) {
    while let Some(event) = stream.next().await {
        handler.handle(event);
    }
    debug!("event stream ended");
}
