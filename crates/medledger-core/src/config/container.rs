use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the record container file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Path to the container file
    pub path: PathBuf,

    /// Fixed width of the embedding vector column (default: 384)
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// SQLite synchronous mode (default: Full)
    #[serde(default)]
    pub synchronous: SynchronousMode,
}

/// SQLite `synchronous` pragma
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// fsync at every commit. Required for audit-grade durability.
    #[default]
    Full,
    /// fsync at checkpoints only.
    Normal,
    /// No fsync. Test workloads only.
    Off,
}

impl SynchronousMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn default_embedding_dim() -> usize {
    384
}

impl ContainerConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            embedding_dim: default_embedding_dim(),
            synchronous: SynchronousMode::default(),
        }
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }
}

/// Configuration for a buffered writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of pending records that triggers an automatic flush (default: 100)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    100
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

impl WriterConfig {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}
