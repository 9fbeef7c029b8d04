//! Process-wide logging setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;
use crate::error::BridgeError;

/// Builds the filter: `RUST_LOG` if set, the configured directives
/// otherwise.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, BridgeError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| BridgeError::Logging(format!("invalid filter \"{}\": {e}", config.filter))),
    }
}

/// Installs the global `tracing` subscriber.
///
/// Fails if a subscriber is already installed or the filter does not
/// parse.
pub fn init_logging(config: &LogConfig) -> Result<(), BridgeError> {
    let filter = env_filter(config)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| BridgeError::Logging(e.to_string()))
}
