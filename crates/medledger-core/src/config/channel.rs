use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Structured log channels, one per concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogChannel {
    /// Incoming requests handled by collaborators
    Request,
    /// Model invocations
    Model,
    /// Container and segment storage activity
    Storage,
    /// Access and audit trail. Rotated files are archived, never deleted.
    Access,
}

impl LogChannel {
    pub const ALL: [LogChannel; 4] = [
        LogChannel::Request,
        LogChannel::Model,
        LogChannel::Storage,
        LogChannel::Access,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogChannel::Request => "request",
            LogChannel::Model => "model",
            LogChannel::Storage => "storage",
            LogChannel::Access => "access",
        }
    }

    /// `tracing` target whose events are routed to this channel.
    pub fn target(&self) -> &'static str {
        match self {
            LogChannel::Request => "medledger::request",
            LogChannel::Model => "medledger::model",
            LogChannel::Storage => "medledger::storage",
            LogChannel::Access => "medledger::access",
        }
    }

    /// Map a `tracing` target to its channel, matching on target prefix.
    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| {
            let prefix = channel.target();
            target == prefix
                || (target.starts_with(prefix) && target[prefix.len()..].starts_with("::"))
        })
    }

    /// Whether rotated files must be archived instead of deleted.
    pub fn is_write_once(&self) -> bool {
        matches!(self, LogChannel::Access)
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for channel log files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLogConfig {
    /// Directory holding one subdirectory per channel
    pub base_dir: PathBuf,

    /// Where rotated access-channel files are moved once past retention.
    /// Defaults to `{base_dir}/archive`.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Size in bytes after which the current file is rotated (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// gzip level for rotated files, 0-9 (default: 6)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    #[serde(default = "default_operational_retention")]
    pub request_retention_days: u32,

    #[serde(default = "default_operational_retention")]
    pub model_retention_days: u32,

    #[serde(default = "default_storage_retention")]
    pub storage_retention_days: u32,

    #[serde(default = "default_access_retention")]
    pub access_retention_days: u32,
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_compression_level() -> u32 {
    6
}

fn default_operational_retention() -> u32 {
    30
}

fn default_storage_retention() -> u32 {
    90
}

fn default_access_retention() -> u32 {
    2555
}

impl ChannelLogConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            archive_dir: None,
            max_file_size: default_max_file_size(),
            compression_level: default_compression_level(),
            request_retention_days: default_operational_retention(),
            model_retention_days: default_operational_retention(),
            storage_retention_days: default_storage_retention(),
            access_retention_days: default_access_retention(),
        }
    }

    pub fn retention_days(&self, channel: LogChannel) -> u32 {
        match channel {
            LogChannel::Request => self.request_retention_days,
            LogChannel::Model => self.model_retention_days,
            LogChannel::Storage => self.storage_retention_days,
            LogChannel::Access => self.access_retention_days,
        }
    }

    pub fn with_retention_days(mut self, channel: LogChannel, days: u32) -> Self {
        match channel {
            LogChannel::Request => self.request_retention_days = days,
            LogChannel::Model => self.model_retention_days = days,
            LogChannel::Storage => self.storage_retention_days = days,
            LogChannel::Access => self.access_retention_days = days,
        }
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_archive_dir(mut self, dir: PathBuf) -> Self {
        self.archive_dir = Some(dir);
        self
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("archive"))
    }

    pub fn channel_dir(&self, channel: LogChannel) -> PathBuf {
        self.base_dir.join(channel.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_from_target() {
        assert_eq!(
            LogChannel::from_target("medledger::access"),
            Some(LogChannel::Access)
        );
        assert_eq!(
            LogChannel::from_target("medledger::storage::flush"),
            Some(LogChannel::Storage)
        );
        assert_eq!(LogChannel::from_target("medledger::accessor"), None);
        assert_eq!(LogChannel::from_target("hyper::client"), None);
    }

    #[test]
    fn test_access_retained_longest() {
        let config = ChannelLogConfig::new(PathBuf::from("/logs"));
        let access = config.retention_days(LogChannel::Access);
        for channel in [LogChannel::Request, LogChannel::Model, LogChannel::Storage] {
            assert!(access > config.retention_days(channel));
        }
        assert!(LogChannel::Access.is_write_once());
        assert!(!LogChannel::Model.is_write_once());
    }
}
