//! Push API stream client binary.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PUSH_API_URL`: event-stream endpoint
//! - `COCO_API_AUTHORIZATION`: value sent as the `Authorization` header
//!
//! ## Optional
//! - `RUST_LOG`: log filter (default: `push_api_client=info`)
//!
//! A `.env` file in the working directory or an ancestor is read first.

use push_api_client::config::load_dotenv;
use push_api_client::telemetry;
use push_api_client::{ConnectionConfig, HttpTransport, StreamClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Read .env before installing the subscriber so it can set RUST_LOG.
    let dotenv = load_dotenv();
    telemetry::init();
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    let config = ConnectionConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
    })?;

    let mut client = StreamClient::new(config, HttpTransport::new());
    client.start()?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = client.finished() => {}
    }

    client.stop();
    Ok(())
}
