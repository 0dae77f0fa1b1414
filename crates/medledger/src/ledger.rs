//! The ledger facade collaborators hold.
//!
//! Bundles the record container, its buffered writers, the audit log and the
//! manifest chain behind one explicitly opened and closed value.

use crate::audit::AuditLog;
use crate::identity;
use crate::manifest::ManifestChain;
use chrono::{DateTime, Utc};
use medledger_core::types::schema::{AUDIT, EMBEDDINGS, INTERACTIONS};
use medledger_core::{
    EmbeddingRecord, IdentityRecord, InteractionRecord, LedgerConfig, LedgerError, Record, Result,
};
use medledger_sqlite::{BufferedWriter, Direction, RecordContainer};
use serde::Serialize;
use std::sync::Arc;

/// Counts and file facts of a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub records: u64,
    pub embeddings: u64,
    pub audit_events: u64,
    /// Records accepted but not yet flushed
    pub pending: u64,
    pub file_size: u64,
    pub created_at: Option<String>,
    pub schema_version: Option<u32>,
}

pub struct Ledger {
    config: LedgerConfig,
    container: Arc<RecordContainer>,
    interactions: BufferedWriter<InteractionRecord>,
    embeddings: BufferedWriter<EmbeddingRecord>,
    audit: AuditLog,
    manifests: ManifestChain,
}

impl Ledger {
    /// Create a new container owned by `owner_identifier` and open it.
    pub fn initialize(config: LedgerConfig, owner_identifier: &str, force: bool) -> Result<Self> {
        config.validate()?;
        let container = RecordContainer::initialize(config.container.clone(), owner_identifier, force)?;
        Self::assemble(config, container)
    }

    /// Open an existing ledger. Fails with `NotFound` if it was never initialized.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let container = RecordContainer::open(config.container.clone())?;
        Self::assemble(config, container)
    }

    fn assemble(config: LedgerConfig, container: RecordContainer) -> Result<Self> {
        let container = Arc::new(container);
        let audit = AuditLog::new(container.clone());
        let manifests = ManifestChain::open(config.manifest.clone(), audit.clone())?;

        tracing::info!(
            target: "medledger::storage",
            path = %config.container.path.display(),
            "Ledger opened"
        );
        Ok(Self {
            interactions: BufferedWriter::new(container.clone(), config.writer.clone()),
            embeddings: BufferedWriter::new(container.clone(), config.writer.clone()),
            config,
            container,
            audit,
            manifests,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn container(&self) -> &Arc<RecordContainer> {
        &self.container
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn manifests(&self) -> &ManifestChain {
        &self.manifests
    }

    /// Buffer an interaction record. Returns its id immediately.
    pub fn append_interaction(&self, record: InteractionRecord) -> Result<String> {
        self.interactions.append(record)
    }

    /// Attach an embedding to a persisted interaction.
    ///
    /// Pending interactions are flushed first. Returns `false` if no
    /// interaction with `record_id` exists; fails with `SchemaInvalid` if the
    /// vector width is not the container's embedding width.
    pub fn append_embedding(&self, record_id: &str, vector: Vec<f32>) -> Result<bool> {
        self.append_embedding_record(EmbeddingRecord::new(record_id, vector))
    }

    pub fn append_embedding_record(&self, record: EmbeddingRecord) -> Result<bool> {
        let width = self
            .container
            .section_spec(EMBEDDINGS)?
            .column("vector")
            .and_then(|c| c.kind.width())
            .ok_or_else(|| LedgerError::SchemaInvalid("embeddings.vector is missing".into()))?;
        if record.vector.len() != width {
            return Err(LedgerError::SchemaInvalid(format!(
                "embedding has {} dimensions, container expects {}",
                record.vector.len(),
                width
            )));
        }

        self.interactions.flush()?;
        if !self
            .container
            .contains_text(INTERACTIONS, "record_id", record.record_id())?
        {
            tracing::debug!(
                target: "medledger::storage",
                record_id = record.record_id(),
                "Embedding refused: unknown record"
            );
            return Ok(false);
        }
        self.embeddings.append(record)?;
        Ok(true)
    }

    /// Flush pending interactions, then pending embeddings.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.interactions.flush()? + self.embeddings.flush()?)
    }

    pub fn get_stats(&self) -> Result<LedgerStats> {
        let stats = self.container.stats()?;
        Ok(LedgerStats {
            records: stats.count(INTERACTIONS),
            embeddings: stats.count(EMBEDDINGS),
            audit_events: stats.count(AUDIT),
            pending: (self.interactions.pending() + self.embeddings.pending()) as u64,
            file_size: stats.file_size,
            created_at: stats.created_at,
            schema_version: stats.schema_version,
        })
    }

    /// The first `limit` persisted interaction records, in stored order
    pub fn read_records(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        self.container.read_records(Direction::Forward, Some(limit))
    }

    /// Persisted interaction records timestamped at or after `since`, in stored order
    pub fn read_records_since(&self, since: DateTime<Utc>) -> Result<Vec<InteractionRecord>> {
        let mut records = Vec::new();
        self.container
            .scan(INTERACTIONS, Direction::Forward, |row| {
                let record = InteractionRecord::from_row(&row)?;
                if record.timestamp >= since {
                    records.push(record);
                }
                Ok(true)
            })?;
        Ok(records)
    }

    pub fn identity(&self) -> Result<Option<IdentityRecord>> {
        identity::show(&self.container)
    }

    pub fn verify_owner(&self, owner_identifier: &str) -> Result<bool> {
        identity::verify(&self.container, owner_identifier)
    }

    /// Flush everything and release the ledger.
    pub fn close(self) -> Result<()> {
        let Ledger {
            interactions,
            embeddings,
            ..
        } = self;
        interactions.close()?;
        embeddings.close()?;
        tracing::info!(target: "medledger::storage", "Ledger closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_core::WriterConfig;
    use tempfile::TempDir;

    fn setup(buffer_size: usize) -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(temp_dir.path())
            .with_embedding_dim(3)
            .with_writer(WriterConfig::new(buffer_size));
        (Ledger::initialize(config, "owner", false).unwrap(), temp_dir)
    }

    #[test]
    fn test_pending_counted_until_flush() {
        let (ledger, _temp) = setup(10);
        ledger.append_interaction(InteractionRecord::new("s", "t")).unwrap();
        let stats = ledger.get_stats().unwrap();
        assert_eq!(stats.records, 0);
        assert_eq!(stats.pending, 1);

        assert_eq!(ledger.flush().unwrap(), 1);
        let stats = ledger.get_stats().unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.schema_version, Some(1));
    }

    #[test]
    fn test_embedding_requires_known_record() {
        let (ledger, _temp) = setup(10);
        let id = ledger.append_interaction(InteractionRecord::new("s", "t")).unwrap();

        assert!(!ledger.append_embedding("missing", vec![0.0; 3]).unwrap());
        assert!(ledger.append_embedding(&id, vec![0.1, 0.2, 0.3]).unwrap());
        assert!(matches!(
            ledger.append_embedding(&id, vec![0.1]),
            Err(LedgerError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn test_read_records_since() {
        let (ledger, _temp) = setup(1);
        let old = chrono::Utc::now() - chrono::Duration::hours(3);
        ledger
            .append_interaction(InteractionRecord::new("s", "old").with_timestamp(old))
            .unwrap();
        ledger.append_interaction(InteractionRecord::new("s", "new")).unwrap();

        let since = ledger
            .read_records_since(chrono::Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].transcript, "new");
        assert_eq!(ledger.read_records(1).unwrap()[0].transcript, "old");
    }

    #[test]
    fn test_close_then_reopen() {
        let (ledger, temp) = setup(10);
        ledger.append_interaction(InteractionRecord::new("s", "t")).unwrap();
        let config = ledger.config().clone();
        ledger.close().unwrap();

        let reopened = Ledger::open(config).unwrap();
        assert_eq!(reopened.get_stats().unwrap().records, 1);
        assert!(reopened.verify_owner("owner").unwrap());
        drop(reopened);

        let missing = LedgerConfig::new(temp.path().join("nowhere"));
        assert!(Ledger::open(missing).err().unwrap().is_not_found());
    }
}
