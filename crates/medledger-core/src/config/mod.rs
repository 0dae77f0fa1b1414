pub mod audit;
pub mod channel;
pub mod container;

pub use audit::{AuditRetentionConfig, ChainGapPolicy, ManifestConfig};
pub use channel::{ChannelLogConfig, LogChannel};
pub use container::{ContainerConfig, SynchronousMode, WriterConfig};

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bundled configuration for a ledger rooted at one directory.
///
/// Layout under `base_dir`:
/// - `ledger.db` - the record container
/// - `manifests.db` - the daily manifest chain
/// - `logs/` - channel log files (with `logs/archive/` for the access channel)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub container: ContainerConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    pub manifest: ManifestConfig,

    #[serde(default)]
    pub retention: AuditRetentionConfig,

    pub logs: ChannelLogConfig,
}

impl LedgerConfig {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        let base = base_dir.as_ref();
        Self {
            container: ContainerConfig::new(base.join("ledger.db")),
            writer: WriterConfig::default(),
            manifest: ManifestConfig::new(base.join("manifests.db")),
            retention: AuditRetentionConfig::default(),
            logs: ChannelLogConfig::new(base.join("logs")),
        }
    }

    /// Load a configuration from a JSON file.
    ///
    /// Missing optional sections fall back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: LedgerConfig = serde_json::from_str(&data)
            .map_err(|e| LedgerError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the ledger misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.container.embedding_dim == 0 {
            return Err(LedgerError::Config("embedding_dim must be > 0".into()));
        }
        if self.writer.buffer_size == 0 {
            return Err(LedgerError::Config("writer.buffer_size must be > 0".into()));
        }
        if self.manifest.lookback_days == 0 {
            return Err(LedgerError::Config("manifest.lookback_days must be > 0".into()));
        }
        for channel in LogChannel::ALL {
            if self.logs.retention_days(channel) == 0 {
                return Err(LedgerError::Config(format!(
                    "retention for channel '{}' must be > 0 days",
                    channel
                )));
            }
        }
        Ok(())
    }

    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.container.embedding_dim = dim;
        self
    }
}
