//! Medledger Core: types and contracts for the append-only clinical record store
//!
//! This crate defines the pieces shared by every medledger backend:
//! - Error taxonomy (`LedgerError`) and the crate-wide `Result` alias
//! - Configuration for the container, writers, manifests and log channels
//! - The section/column schema catalog of the record container
//! - Audit events, daily manifests and the record types collaborators append
//! - Deterministic content hashing over a canonical payload form
//!
//! Nothing here touches the filesystem; persistence lives in `medledger-sqlite`
//! and `medledger-file-log`.

pub mod config;
pub mod error;
pub mod hashing;
pub mod observe;
pub mod types;

pub use config::{
    AuditRetentionConfig, ChainGapPolicy, ChannelLogConfig, ContainerConfig, LedgerConfig,
    LogChannel, ManifestConfig, SynchronousMode, WriterConfig,
};
pub use error::{LedgerError, Result};
pub use hashing::{canonical_json, hash_payload, sha256_hex, Payload};
pub use types::{
    AuditEvent, AuditStatus, ColumnKind, ColumnSpec, ColumnValue, DailyManifest,
    EmbeddingRecord, IdentityRecord, InteractionRecord, Record, RetentionMark, Row, SectionSpec,
};
