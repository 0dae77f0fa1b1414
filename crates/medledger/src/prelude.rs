//! Medledger Prelude
//!
//! ```
//! use medledger::prelude::*;
//! ```

pub use crate::{
    AuditEvent, AuditLog, AuditStatus, ChainReport, DailyManifest, EmbeddingRecord,
    InteractionRecord, Ledger, LedgerConfig, LedgerError, LedgerStats, ManifestChain, Payload,
    Result,
};

pub use crate::{CleanupStats, RetentionStats};
pub use crate::{ChannelLayer, ChannelLogs, LogChannel};

pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
