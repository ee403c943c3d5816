//! Log subscriber setup

use crate::config::LoggingSettings;
use crate::error::{ConfigError, ConfigResult};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// Call once at startup, before anything logs.
pub fn init(settings: &LoggingSettings) -> ConfigResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| ConfigError::Invalid(format!("log level {:?}: {}", settings.level, e)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(settings.json.then(|| fmt::layer().json()))
        .with((!settings.json).then(|| fmt::layer().with_target(false)))
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("failed to install log subscriber: {}", e)))?;

    tracing::debug!(level = %settings.level, json = settings.json, "Logging initialized");
    Ok(())
}
