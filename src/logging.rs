//! Logging setup

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber at the configured level
///
/// `RUST_LOG` takes precedence when set. If a subscriber is already
/// installed this is a no-op.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            Error::InvalidConfig(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        debug!("Global subscriber already installed");
    }

    Ok(())
}
