use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do when no previous manifest exists inside the lookback window
/// although older manifests do exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainGapPolicy {
    /// Start a new, unlinked chain segment and log a warning.
    #[default]
    NewSegment,
    /// Refuse to create the manifest.
    Fail,
}

/// Configuration for the daily manifest chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Path to the manifest store file
    pub path: PathBuf,

    /// How far back to look for the previous manifest (default: 365 days)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Behaviour when the lookback window is exhausted (default: new segment)
    #[serde(default)]
    pub gap_policy: ChainGapPolicy,
}

fn default_lookback_days() -> u32 {
    365
}

impl ManifestConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lookback_days: default_lookback_days(),
            gap_policy: ChainGapPolicy::default(),
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_gap_policy(mut self, policy: ChainGapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }
}

/// Retention of audit rows inside the container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRetentionConfig {
    /// Rows older than this are eligible for retention cleanup
    /// (default: 2555 days, seven years)
    #[serde(default = "default_audit_retention_days")]
    pub retention_days: u32,
}

fn default_audit_retention_days() -> u32 {
    2555
}

impl Default for AuditRetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_audit_retention_days(),
        }
    }
}
