//! Daily manifest chain over the audit trail.
//!
//! Each manifest folds the content hashes of one UTC day's audit events into
//! `access_log_hash` and links to the manifest of the closest earlier date.
//! [`ManifestChain::verify_manifest_chain`] re-derives every hash and reports
//! each mismatch instead of stopping at the first.

use crate::audit::AuditLog;
use chrono::{Duration, NaiveDate, Utc};
use medledger_core::types::time::now;
use medledger_core::{
    observe, AuditEvent, ChainGapPolicy, DailyManifest, LedgerError, ManifestConfig, Result,
};
use medledger_sqlite::ManifestStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// What went wrong with one manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainErrorKind {
    /// The stored `manifest_hash` does not match its own fields
    ManifestHashMismatch { stored: String, computed: String },
    /// `previous_manifest_hash` does not point at the closest earlier manifest
    PreviousHashMismatch {
        expected: Option<String>,
        found: Option<String>,
    },
    /// The day's live audit events no longer hash to `access_log_hash`
    AccessLogHashMismatch { stored: String, computed: String },
    /// The day's live audit events no longer number `event_count`
    EventCountMismatch { stored: u64, computed: u64 },
    /// A stored manifest row no longer decodes
    UnreadableManifest { reason: String },
    /// A stored audit row has no readable timestamp, so no day can claim it
    UnreadableEvent { index: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainError {
    /// Day of the affected manifest, when known
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub kind: ChainErrorKind,
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{}: ", date)?,
            None => f.write_str("unknown date: ")?,
        }
        match &self.kind {
            ChainErrorKind::ManifestHashMismatch { stored, computed } => write!(
                f,
                "manifest hash mismatch (stored {}, computed {})",
                stored, computed
            ),
            ChainErrorKind::PreviousHashMismatch { expected, found } => write!(
                f,
                "chain broken (expected previous {}, found {})",
                expected.as_deref().unwrap_or("none"),
                found.as_deref().unwrap_or("none")
            ),
            ChainErrorKind::AccessLogHashMismatch { stored, computed } => write!(
                f,
                "audit events changed (access log hash stored {}, computed {})",
                stored, computed
            ),
            ChainErrorKind::EventCountMismatch { stored, computed } => write!(
                f,
                "audit event count changed (stored {}, now {})",
                stored, computed
            ),
            ChainErrorKind::UnreadableManifest { reason } => {
                write!(f, "manifest unreadable ({})", reason)
            }
            ChainErrorKind::UnreadableEvent { index, reason } => {
                write!(f, "audit event {} unreadable ({})", index, reason)
            }
        }
    }
}

/// Result of a chain verification. Never an error: every problem is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub valid: bool,
    pub manifests_checked: u64,
    /// Days whose audit rows were removed by retention; their access log hash
    /// cannot be recomputed and is not checked
    pub pruned_dates: Vec<NaiveDate>,
    pub errors: Vec<ChainError>,
}

/// Creates and verifies daily manifests
pub struct ManifestChain {
    store: ManifestStore,
    audit: AuditLog,
    config: ManifestConfig,
}

impl ManifestChain {
    pub fn open(config: ManifestConfig, audit: AuditLog) -> Result<Self> {
        let store = ManifestStore::open(&config.path)?;
        Ok(Self {
            store,
            audit,
            config,
        })
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Manifest the audit events of `date` (default: yesterday, UTC).
    ///
    /// Fails with `ManifestExists` if the date already has a manifest and with
    /// `InvalidState` if a later date does, since links are only ever added at
    /// the end of the chain.
    pub fn create_daily_manifest(&self, date: Option<NaiveDate>) -> Result<DailyManifest> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive() - Duration::days(1));

        if self.store.get(date)?.is_some() {
            return Err(LedgerError::ManifestExists(date));
        }
        if let Some(latest) = self.store.latest()? {
            if latest.date > date {
                return Err(LedgerError::InvalidState(format!(
                    "cannot manifest {}: the chain already extends to {}",
                    date, latest.date
                )));
            }
        }

        let events = self.audit.events_on(date)?;
        let hashes: Vec<String> = events.iter().map(|e| e.content_hash()).collect();
        let access_log_hash = DailyManifest::fold_event_hashes(hashes.iter().map(String::as_str));

        let previous = self.expected_previous(date)?;
        let manifest = DailyManifest::new(
            date,
            access_log_hash,
            events.len() as u64,
            previous,
            now(),
        );
        self.store.insert(&manifest)?;
        observe::record_manifest_created(manifest.event_count);

        tracing::info!(
            target: "medledger::access",
            date = %date,
            event_count = manifest.event_count,
            manifest_hash = %manifest.manifest_hash,
            "Daily manifest created"
        );
        Ok(manifest)
    }

    /// `manifest_hash` the manifest for `date` must link to
    fn expected_previous(&self, date: NaiveDate) -> Result<Option<String>> {
        if let Some(previous) = self.store.latest_before(date, self.config.lookback_days)? {
            return Ok(Some(previous.manifest_hash));
        }
        if !self.store.any_before(date)? {
            return Ok(None);
        }
        match self.config.gap_policy {
            ChainGapPolicy::NewSegment => {
                tracing::warn!(
                    target: "medledger::access",
                    date = %date,
                    lookback_days = self.config.lookback_days,
                    "No manifest within lookback window, starting a new chain segment"
                );
                Ok(None)
            }
            ChainGapPolicy::Fail => Err(LedgerError::InvalidState(format!(
                "no manifest within {} days before {}",
                self.config.lookback_days, date
            ))),
        }
    }

    pub fn get_manifest(&self, date: NaiveDate) -> Result<Option<DailyManifest>> {
        self.store.get(date)
    }

    pub fn list_manifests(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyManifest>> {
        self.store.list(start, end)
    }

    /// Verify every manifest in the inclusive date range.
    ///
    /// Store failures are reported as `Err`; integrity problems never are.
    pub fn verify_manifest_chain(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ChainReport> {
        let started = Instant::now();
        let stored = self.store.list_stored(start, end)?;
        let mut report = ChainReport::default();

        let retention_cutoff = self.audit.retention_cutoff()?;
        let dates: Vec<NaiveDate> = stored.iter().filter_map(|s| s.date).collect();
        let live = self.live_event_hashes(&dates, &mut report.errors)?;

        for entry in stored {
            report.manifests_checked += 1;
            let manifest = match entry.manifest {
                Ok(manifest) => manifest,
                Err(e) => {
                    report.errors.push(ChainError {
                        date: entry.date,
                        kind: ChainErrorKind::UnreadableManifest {
                            reason: e.to_string(),
                        },
                    });
                    continue;
                }
            };
            let date = manifest.date;

            let computed = manifest.recompute_hash();
            if computed != manifest.manifest_hash {
                report.errors.push(ChainError {
                    date: Some(date),
                    kind: ChainErrorKind::ManifestHashMismatch {
                        stored: manifest.manifest_hash.clone(),
                        computed,
                    },
                });
            }

            let expected = self
                .store
                .latest_hash_before(date, self.config.lookback_days)?;
            if expected != manifest.previous_manifest_hash {
                report.errors.push(ChainError {
                    date: Some(date),
                    kind: ChainErrorKind::PreviousHashMismatch {
                        expected,
                        found: manifest.previous_manifest_hash.clone(),
                    },
                });
            }

            let day_start = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
            let pruned = match (retention_cutoff, day_start) {
                (Some(cutoff), Some(day_start)) => day_start < cutoff,
                _ => false,
            };
            if pruned {
                report.pruned_dates.push(date);
                continue;
            }

            let hashes = live.get(&date).map(Vec::as_slice).unwrap_or(&[]);
            let computed = DailyManifest::fold_event_hashes(hashes.iter().map(String::as_str));
            if computed != manifest.access_log_hash {
                report.errors.push(ChainError {
                    date: Some(date),
                    kind: ChainErrorKind::AccessLogHashMismatch {
                        stored: manifest.access_log_hash.clone(),
                        computed,
                    },
                });
            }
            if hashes.len() as u64 != manifest.event_count {
                report.errors.push(ChainError {
                    date: Some(date),
                    kind: ChainErrorKind::EventCountMismatch {
                        stored: manifest.event_count,
                        computed: hashes.len() as u64,
                    },
                });
            }
        }

        report.valid = report.errors.is_empty();
        observe::record_chain_verification(started.elapsed(), report.valid);
        if report.valid {
            tracing::info!(
                target: "medledger::access",
                manifests_checked = report.manifests_checked,
                "Manifest chain verified"
            );
        } else {
            for error in &report.errors {
                tracing::warn!(target: "medledger::access", "Manifest chain: {}", error);
            }
        }
        Ok(report)
    }

    /// Content hashes of the live audit events of each date, in stored order.
    ///
    /// Hashes come from the raw stored values. A row whose timestamp cannot
    /// be read is reported in `errors` and belongs to no day.
    fn live_event_hashes(
        &self,
        dates: &[NaiveDate],
        errors: &mut Vec<ChainError>,
    ) -> Result<BTreeMap<NaiveDate, Vec<String>>> {
        let mut hashes: BTreeMap<NaiveDate, Vec<String>> =
            dates.iter().map(|d| (*d, Vec::new())).collect();
        if hashes.is_empty() {
            return Ok(hashes);
        }
        self.audit.for_each_row(|row| match AuditEvent::row_date(&row) {
            Ok(day) => {
                if let Some(day) = hashes.get_mut(&day) {
                    day.push(AuditEvent::row_content_hash(&row));
                }
            }
            Err(e) => errors.push(ChainError {
                date: None,
                kind: ChainErrorKind::UnreadableEvent {
                    index: row.index,
                    reason: e.to_string(),
                },
            }),
        })?;
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_core::{AuditEvent, AuditStatus, ContainerConfig, Payload};
    use medledger_sqlite::RecordContainer;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(config: impl FnOnce(ManifestConfig) -> ManifestConfig) -> (ManifestChain, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let container_config =
            ContainerConfig::new(temp_dir.path().join("ledger.db")).with_embedding_dim(2);
        let container = RecordContainer::initialize(container_config, "owner", false).unwrap();
        let audit = AuditLog::new(Arc::new(container));
        let manifest_config = config(ManifestConfig::new(temp_dir.path().join("manifests.db")));
        (ManifestChain::open(manifest_config, audit).unwrap(), temp_dir)
    }

    fn day(offset: i64) -> NaiveDate {
        Utc::now().date_naive() - Duration::days(offset)
    }

    fn event_on(date: NaiveDate, op: &str) -> AuditEvent {
        let ts = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
        AuditEvent::new(op, "a", "/r", &Payload::from(op), &Payload::Null, AuditStatus::Success)
            .with_timestamp(ts)
    }

    #[test]
    fn test_empty_day_hashes_empty_string() {
        let (chain, _temp) = setup(|c| c);
        let manifest = chain.create_daily_manifest(Some(day(3))).unwrap();
        assert_eq!(manifest.event_count, 0);
        assert_eq!(manifest.access_log_hash, medledger_core::sha256_hex(b""));
        assert_eq!(manifest.previous_manifest_hash, None);
    }

    #[test]
    fn test_default_date_is_yesterday() {
        let (chain, _temp) = setup(|c| c);
        let manifest = chain.create_daily_manifest(None).unwrap();
        assert_eq!(manifest.date, day(1));
        assert!(matches!(
            chain.create_daily_manifest(None),
            Err(LedgerError::ManifestExists(d)) if d == day(1)
        ));
    }

    #[test]
    fn test_links_and_ordering() {
        let (chain, _temp) = setup(|c| c);
        chain.audit.append_event(event_on(day(5), "A")).unwrap();
        let first = chain.create_daily_manifest(Some(day(5))).unwrap();
        let second = chain.create_daily_manifest(Some(day(3))).unwrap();
        assert_eq!(first.event_count, 1);
        assert_eq!(second.previous_manifest_hash, Some(first.manifest_hash.clone()));

        let err = chain.create_daily_manifest(Some(day(4))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));

        assert_eq!(chain.list_manifests(None, None).unwrap().len(), 2);
        assert_eq!(chain.get_manifest(day(5)).unwrap(), Some(first));
    }

    #[test]
    fn test_gap_policy() {
        let (chain, _temp) = setup(|c| c.with_lookback_days(2));
        chain.create_daily_manifest(Some(day(10))).unwrap();
        let segment = chain.create_daily_manifest(Some(day(5))).unwrap();
        assert_eq!(segment.previous_manifest_hash, None);
        assert!(chain.verify_manifest_chain(None, None).unwrap().valid);

        let (strict, _t) = setup(|c| c.with_lookback_days(2).with_gap_policy(ChainGapPolicy::Fail));
        strict.create_daily_manifest(Some(day(10))).unwrap();
        assert!(matches!(
            strict.create_daily_manifest(Some(day(5))),
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_verify_reports_missing_event() {
        let (chain, _temp) = setup(|c| c);
        chain.audit.append_event(event_on(day(2), "A")).unwrap();
        chain.create_daily_manifest(Some(day(2))).unwrap();
        chain.audit.append_event(event_on(day(2), "LATE")).unwrap();

        let report = chain.verify_manifest_chain(None, None).unwrap();
        assert!(!report.valid);
        assert_eq!(report.manifests_checked, 1);
        assert!(report
            .errors
            .iter()
            .all(|e| e.date == Some(day(2))));
        assert!(report.errors.iter().any(|e| matches!(
            e.kind,
            ChainErrorKind::EventCountMismatch { stored: 1, computed: 2 }
        )));
    }
}
