//! Log output setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by the `[logging]`
//! config section. `CHANGETRACK_LOG` overrides the configured filter.

use crate::config::LoggingConfig;
use changetrack_core::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "CHANGETRACK_LOG";

/// Build the filter for `config`, honoring [`LOG_ENV`]
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?;
    for (target, level) in &config.targets {
        let directive = format!("{}={}", target, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| Error::Config(format!("Invalid log directive '{}': {}", directive, e)))?,
        );
    }
    Ok(filter)
}

/// Install the global subscriber
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(config: &LoggingConfig) -> Result<bool> {
    let filter = build_filter(config)?;
    let installed = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(config.ansi))
        .try_init()
        .is_ok();
    Ok(installed)
}
