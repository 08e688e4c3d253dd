//! Context configuration via `changetrack.toml`
//!
//! Every context created from a [`Database`](crate::Database) starts from
//! the database's config. Pooled contexts are restored to it on return.

use changetrack_core::{CascadeTiming, Error, Result};
use changetrack_tracking::TrackerOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "changetrack.toml";

// ============================================================================
// Query tracking
// ============================================================================

/// Whether query results are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTrackingBehavior {
    /// Rows become Unchanged entries; tracked instances are reused
    #[default]
    TrackAll,
    /// Rows become fresh untracked instances
    NoTracking,
    /// Untracked, but rows with equal keys share one instance per query
    NoTrackingWithIdentityResolution,
}

// ============================================================================
// Logging
// ============================================================================

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter: trace, debug, info, warn, error, off
    #[serde(default = "default_level")]
    pub level: String,
    /// Colored output
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Per-target levels, e.g. `"changetrack::tracking" = "trace"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            ansi: true,
            targets: BTreeMap::new(),
        }
    }
}

// ============================================================================
// ContextConfig
// ============================================================================

/// Context configuration loaded from `changetrack.toml`
///
/// # Example
///
/// ```toml
/// query_tracking = "track_all"
///
/// [tracking]
/// auto_detect_changes = true
/// cascade_delete_timing = "immediate"
/// delete_orphans_timing = "immediate"
/// sensitive_data_logging = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Tracking behavior of query results
    #[serde(default)]
    pub query_tracking: QueryTrackingBehavior,
    /// Registry options
    #[serde(default)]
    pub tracking: TrackerOptions,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ContextConfig {
    /// Shorthand for the cascade timing
    pub fn with_cascade_delete_timing(mut self, timing: CascadeTiming) -> Self {
        self.tracking.cascade_delete_timing = timing;
        self
    }

    /// Shorthand for the orphan timing
    pub fn with_delete_orphans_timing(mut self, timing: CascadeTiming) -> Self {
        self.tracking.delete_orphans_timing = timing;
        self
    }

    /// Shorthand for sensitive-data logging
    pub fn with_sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.tracking.sensitive_data_logging = enabled;
        self
    }

    /// Shorthand for the query tracking behavior
    pub fn with_query_tracking(mut self, behavior: QueryTrackingBehavior) -> Self {
        self.query_tracking = behavior;
        self
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# changetrack context configuration
#
# Query results: "track_all" (default), "no_tracking" or
# "no_tracking_with_identity_resolution"
query_tracking = "track_all"

[tracking]
# Detect changes before entry reads and commits
auto_detect_changes = true
# When dependents of a deleted principal are deleted:
#   "immediate" (default), "on_save_changes" or "never"
cascade_delete_timing = "immediate"
# When required dependents that lost their principal are deleted
delete_orphans_timing = "immediate"
# Include key values in errors and diagnostics
sensitive_data_logging = false

[logging]
level = "info"
ansi = true
# [logging.targets]
# "changetrack::tracking" = "trace"
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
