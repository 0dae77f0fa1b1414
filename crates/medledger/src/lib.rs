//! Medledger: append-only clinical record ledger
//!
//! Medledger provides:
//! - **Record container**: interaction records and embeddings appended to
//!   parallel columns that never shrink and never change
//! - **Audit log**: one row per sensitive operation holding only content
//!   hashes of the request and result
//! - **Manifest chain**: a daily, hash-linked digest of the audit trail that
//!   makes retroactive edits detectable
//! - **Channel logs**: structured log files rotated and retained per concern
//!
//! # Quick Start
//!
//! ```no_run
//! use medledger::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let config = LedgerConfig::new("./data");
//! let ledger = Ledger::initialize(config, "dr.alvarez@clinic.example", false)?;
//!
//! let id = ledger.append_interaction(InteractionRecord::new("session-1", "transcript"))?;
//! ledger.audit().append_audit_log(
//!     "NOTE_CREATE",
//!     "dr-alvarez",
//!     &format!("/interactions/{}", id),
//!     &Payload::from("transcript"),
//!     &Payload::Null,
//!     AuditStatus::Success,
//!     None,
//! )?;
//! ledger.close()?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod identity;
pub mod ledger;
pub mod manifest;
pub mod prelude;
pub mod retention;

pub use medledger_core::{
    canonical_json, hash_payload, AuditEvent, AuditRetentionConfig, AuditStatus, ChainGapPolicy,
    ChannelLogConfig, ContainerConfig, DailyManifest, EmbeddingRecord, IdentityRecord,
    InteractionRecord, LedgerConfig, LedgerError, LogChannel, ManifestConfig, Payload, Record,
    Result, RetentionMark, WriterConfig,
};
pub use medledger_file_log::{ChannelLayer, ChannelLogs, CleanupReport};
pub use medledger_sqlite::{ManifestStore, RecordContainer, ValidationReport};

pub use audit::AuditLog;
pub use ledger::{Ledger, LedgerStats};
pub use manifest::{ChainError, ChainErrorKind, ChainReport, ManifestChain};
pub use retention::{CleanupStats, RetentionStats};
