//! Client for the push API event stream.
//!
//! Connects to `PUSH_API_URL` with `COCO_API_AUTHORIZATION` as the `Authorization` header,
//! and logs every lifecycle event of the stream as a key=value line.
//!
//! ```no_run
//! use push_api_client::{ConnectionConfig, HttpTransport, StreamClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnectionConfig::from_env()?;
//! let mut client = StreamClient::new(config, HttpTransport::new());
//! client.start()?;
//! client.finished().await;
//! client.stop();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod event;
pub mod handler;
pub mod telemetry;
pub mod transport;

pub use client::{ClientError, ConnectionState, StreamClient};
pub use codec::{SseCodec, SseCodecError, SseEvent};
pub use config::{ConfigError, ConnectionConfig};
pub use event::{ErrorRecord, StreamEvent};
pub use handler::{EventHandler, Handled, LoggingHandler};
pub use transport::{EventStream, HttpTransport, Transport, TransportError};
