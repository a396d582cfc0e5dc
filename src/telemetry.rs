//! Console logging setup.
//!
//! Lines are written by `tracing-subscriber`'s fmt layer. `RUST_LOG` overrides the
//! default `push_api_client=info` filter.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "push_api_client=info";

/// Build the filter from `RUST_LOG`, falling back to [`DEFAULT_DIRECTIVE`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber.
///
/// Returns `false` if one was already installed.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}
