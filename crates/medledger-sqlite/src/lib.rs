//! SQLite-backed record container
//!
//! One SQLite file holds every section of the container. Each column is its
//! own table keyed by a dense `idx`, so a section is a set of parallel,
//! independently sized sequences that must stay the same length.
//!
//! Key features:
//! - Column tables refuse `UPDATE`/`DELETE` through triggers
//! - `AppendOnlyGuard` snapshots column lengths and rejects shrink/overwrite
//! - `BufferedWriter` batches records into one guarded transaction
//! - Retention rebuilds a section in a single transaction (build, then swap)
//! - `ManifestStore` keeps the daily manifest chain in a separate file

pub mod container;
pub mod guard;
pub mod manifest_store;
pub mod rebuild;
pub mod schema;
pub mod writer;

pub use container::{ContainerStats, Direction, RecordContainer, ValidationReport};
pub use guard::AppendOnlyGuard;
pub use manifest_store::{ManifestStore, StoredManifest};
pub use rebuild::{replace_section_retaining, RebuildOutcome};
pub use writer::BufferedWriter;

use medledger_core::LedgerError;

pub(crate) fn sql_err(e: rusqlite::Error) -> LedgerError {
    LedgerError::Sqlite(e.to_string())
}
