//! Registry options

use changetrack_core::CascadeTiming;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Behavior switches of a [`ChangeTracker`](crate::ChangeTracker)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerOptions {
    /// Run change detection before reading entries and committing
    #[serde(default = "default_true")]
    pub auto_detect_changes: bool,
    /// When dependents of a deleted principal are cascaded
    #[serde(default)]
    pub cascade_delete_timing: CascadeTiming,
    /// When orphaned required dependents are deleted
    #[serde(default)]
    pub delete_orphans_timing: CascadeTiming,
    /// Include key values in errors and diagnostics
    #[serde(default)]
    pub sensitive_data_logging: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            auto_detect_changes: true,
            cascade_delete_timing: CascadeTiming::Immediate,
            delete_orphans_timing: CascadeTiming::Immediate,
            sensitive_data_logging: false,
        }
    }
}
