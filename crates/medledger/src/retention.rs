//! Age-based retention of audit rows.
//!
//! Removing expired rows is the single exception to append-only storage. It
//! goes through [`medledger_sqlite::replace_section_retaining`], which rebuilds
//! the audit section with the kept rows and records a [`RetentionMark`] in the
//! same transaction.

use crate::audit::AuditLog;
use chrono::{DateTime, Duration, Utc};
use medledger_core::types::schema::{AUDIT, RETENTION};
use medledger_core::types::time::{now, parse_timestamp};
use medledger_core::{Record, Result, RetentionMark};
use medledger_sqlite::{replace_section_retaining, Direction};
use serde::Serialize;

/// Outcome of [`AuditLog::cleanup_old_logs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    /// Rows removed (always 0 on a dry run)
    pub deleted: u64,
    /// Rows retained
    pub kept: u64,
    /// Rows a real run would remove (always 0 on a real run)
    pub would_delete: u64,
}

/// Read-only retention report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionStats {
    pub total: u64,
    pub within_retention: u64,
    pub beyond_retention: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Share of rows beyond retention, 0-100
    pub percentage_old: f64,
}

fn cutoff(days: u32) -> DateTime<Utc> {
    now() - Duration::days(i64::from(days))
}

impl AuditLog {
    /// Indices of rows timestamped before `now - days`
    pub fn get_logs_older_than(&self, days: u32) -> Result<Vec<u64>> {
        let cutoff = cutoff(days);
        let mut indices = Vec::new();
        self.for_each(|index, event| {
            if event.timestamp < cutoff {
                indices.push(index);
            }
            Ok(())
        })?;
        Ok(indices)
    }

    /// Remove rows older than `days`, or only count them when `dry_run`.
    ///
    /// A real run decides which rows expire inside the rebuild transaction,
    /// so events appended meanwhile are never removed and the recorded mark
    /// always matches the rows actually dropped.
    pub fn cleanup_old_logs(&self, days: u32, dry_run: bool) -> Result<CleanupStats> {
        let cutoff = cutoff(days);

        if dry_run {
            let mut kept = 0u64;
            let mut expired = 0u64;
            self.for_each(|_, event| {
                if event.timestamp < cutoff {
                    expired += 1;
                } else {
                    kept += 1;
                }
                Ok(())
            })?;
            tracing::info!(
                target: "medledger::access",
                days,
                would_delete = expired,
                kept,
                "Audit retention dry run"
            );
            return Ok(CleanupStats {
                deleted: 0,
                kept,
                would_delete: expired,
            });
        }

        if !self.has_section()? {
            return Ok(CleanupStats::default());
        }
        let outcome = replace_section_retaining(
            self.container(),
            AUDIT,
            |row| Ok(parse_timestamp(row.text("timestamp")?)? >= cutoff),
            |outcome| RetentionMark::new(AUDIT, cutoff, outcome.removed),
        )?;
        if outcome.removed > 0 {
            tracing::warn!(
                target: "medledger::access",
                days,
                deleted = outcome.removed,
                kept = outcome.kept,
                cutoff = %cutoff,
                "Audit rows removed by retention"
            );
        }
        Ok(CleanupStats {
            deleted: outcome.removed,
            kept: outcome.kept,
            would_delete: 0,
        })
    }

    /// Counts and age range of audit rows against a retention window
    pub fn get_retention_stats(&self, retention_days: u32) -> Result<RetentionStats> {
        let cutoff = cutoff(retention_days);
        let mut stats = RetentionStats {
            total: 0,
            within_retention: 0,
            beyond_retention: 0,
            oldest: None,
            newest: None,
            percentage_old: 0.0,
        };
        self.for_each(|_, event| {
            stats.total += 1;
            if event.timestamp < cutoff {
                stats.beyond_retention += 1;
            } else {
                stats.within_retention += 1;
            }
            stats.oldest = Some(stats.oldest.map_or(event.timestamp, |t| t.min(event.timestamp)));
            stats.newest = Some(stats.newest.map_or(event.timestamp, |t| t.max(event.timestamp)));
            Ok(())
        })?;
        if stats.total > 0 {
            stats.percentage_old = stats.beyond_retention as f64 * 100.0 / stats.total as f64;
        }
        Ok(stats)
    }

    /// Latest instant before which audit rows were lawfully removed.
    ///
    /// Marks that no longer decode are skipped, so days they would have
    /// excused are still checked.
    pub fn retention_cutoff(&self) -> Result<Option<DateTime<Utc>>> {
        let mut latest: Option<DateTime<Utc>> = None;
        self.container().scan(RETENTION, Direction::Forward, |row| {
            match RetentionMark::from_row(&row) {
                Ok(mark) if mark.section == AUDIT => {
                    latest = Some(latest.map_or(mark.cutoff, |t| t.max(mark.cutoff)));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    target: "medledger::access",
                    index = row.index,
                    error = %e,
                    "Unreadable retention mark ignored"
                ),
            }
            Ok(true)
        })?;
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_core::{AuditEvent, AuditStatus, ContainerConfig, Payload};
    use medledger_sqlite::RecordContainer;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (AuditLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = ContainerConfig::new(temp_dir.path().join("ledger.db")).with_embedding_dim(2);
        let container = RecordContainer::initialize(config, "owner", false).unwrap();
        (AuditLog::new(Arc::new(container)), temp_dir)
    }

    fn event_aged(days: i64) -> AuditEvent {
        AuditEvent::new("READ", "a", "/r", &Payload::Null, &Payload::Null, AuditStatus::Success)
            .with_timestamp(now() - Duration::days(days))
    }

    #[test]
    fn test_older_than_indices() {
        let (log, _temp) = setup();
        for age in [200, 5, 120, 0] {
            log.append_event(event_aged(age)).unwrap();
        }
        assert_eq!(log.get_logs_older_than(90).unwrap(), vec![0, 2]);
        assert!(log.get_logs_older_than(365).unwrap().is_empty());
    }

    #[test]
    fn test_retention_stats() {
        let (log, _temp) = setup();
        let empty = log.get_retention_stats(30).unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.percentage_old, 0.0);
        assert!(empty.oldest.is_none());

        for age in [40, 10, 50, 1] {
            log.append_event(event_aged(age)).unwrap();
        }
        let stats = log.get_retention_stats(30).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.beyond_retention, 2);
        assert_eq!(stats.within_retention, 2);
        assert_eq!(stats.percentage_old, 50.0);
        assert!(stats.oldest.unwrap() < stats.newest.unwrap());
    }

    #[test]
    fn test_cleanup_records_mark() {
        let (log, _temp) = setup();
        assert_eq!(log.retention_cutoff().unwrap(), None);
        log.append_event(event_aged(100)).unwrap();
        log.append_event(event_aged(0)).unwrap();

        let stats = log.cleanup_old_logs(90, false).unwrap();
        assert_eq!(stats, CleanupStats { deleted: 1, kept: 1, would_delete: 0 });
        let cutoff = log.retention_cutoff().unwrap().unwrap();
        assert!(cutoff < now() - Duration::days(89));

        // Nothing left to remove
        let again = log.cleanup_old_logs(90, false).unwrap();
        assert_eq!(again, CleanupStats { deleted: 0, kept: 1, would_delete: 0 });
    }

    #[test]
    fn test_cleanup_spares_events_appended_meanwhile() {
        let (log, _temp) = setup();
        for _ in 0..500 {
            log.append_event(event_aged(200)).unwrap();
        }

        let writer = log.clone();
        let appender = std::thread::spawn(move || {
            for _ in 0..100 {
                writer.append_event(event_aged(0)).unwrap();
            }
        });
        let stats = log.cleanup_old_logs(90, false).unwrap();
        appender.join().unwrap();

        assert_eq!(stats.deleted, 500);
        let marks: Vec<RetentionMark> = log
            .container()
            .read_records(Direction::Forward, None)
            .unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].removed, stats.deleted);

        let remaining = log.get_audit_logs(usize::MAX, None, None).unwrap();
        assert_eq!(remaining.len(), 100);
        assert!(remaining
            .iter()
            .all(|e| e.timestamp > now() - Duration::days(1)));
    }
}
