//! Append-only guarantees of the record container.
//!
//! Every committed write leaves each column at least as long as before and
//! every section's columns at equal length. Overwrites and shrinks are
//! refused with `AppendOnlyViolation`.

use medledger_core::types::schema::{AUDIT, INTERACTIONS};
use medledger_core::{
    AuditEvent, AuditStatus, ColumnValue, ContainerConfig, InteractionRecord, LedgerError,
    Payload, Record, Row, WriterConfig,
};
use medledger_sqlite::{BufferedWriter, Direction, RecordContainer};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn setup() -> (Arc<RecordContainer>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = ContainerConfig::new(temp_dir.path().join("ledger.db")).with_embedding_dim(4);
    let container = RecordContainer::initialize(config, "owner", false).unwrap();
    (Arc::new(container), temp_dir)
}

fn section_lengths(container: &RecordContainer, section: &str) -> Vec<u64> {
    container
        .section_spec(section)
        .unwrap()
        .columns
        .iter()
        .map(|c| container.column_len(section, &c.name).unwrap())
        .collect()
}

#[test]
fn test_overwrite_rejected_by_guard() {
    let (container, _temp) = setup();
    let writer = BufferedWriter::new(container.clone(), WriterConfig::new(10));
    writer.append(InteractionRecord::new("s", "a")).unwrap();
    writer.flush().unwrap();

    let guard = container.begin_append().unwrap();
    assert_eq!(guard.original_size(INTERACTIONS, "note").unwrap(), 1);
    let err = guard.validate_write_index(INTERACTIONS, "note", 0).unwrap_err();
    assert!(matches!(err, LedgerError::AppendOnlyViolation(_)));
    assert!(guard.validate_write_index(INTERACTIONS, "note", 1).unwrap());

    let err = guard.validate_resize(INTERACTIONS, "note", 0).unwrap_err();
    assert!(err.is_integrity_violation());
    assert!(guard.validate_resize(INTERACTIONS, "note", 5).unwrap());
}

#[test]
fn test_single_column_append_cannot_commit_unequal_section() {
    let (container, _temp) = setup();
    let mut guard = container.begin_append().unwrap();
    guard
        .append_column(INTERACTIONS, "note", &[ColumnValue::from("orphan")])
        .unwrap();
    assert!(guard.commit().is_err());

    assert_eq!(section_lengths(&container, INTERACTIONS), vec![0; 7]);
}

#[test]
fn test_dropped_guard_rolls_back() {
    let (container, _temp) = setup();
    {
        let mut guard = container.begin_append().unwrap();
        guard
            .append_rows(INTERACTIONS, &[InteractionRecord::new("s", "t").to_columns()])
            .unwrap();
        assert_eq!(guard.current_size(INTERACTIONS, "transcript").unwrap(), 1);
    }
    assert_eq!(container.section_len(INTERACTIONS).unwrap(), 0);
}

#[test]
fn test_storage_refuses_raw_update() {
    let (container, temp) = setup();
    let mut guard = container.begin_append().unwrap();
    let event = AuditEvent::new(
        "READ",
        "dr-1",
        "/records/1",
        &Payload::from("q"),
        &Payload::Null,
        AuditStatus::Success,
    );
    guard.append_rows(AUDIT, &[event.to_columns()]).unwrap();
    guard.commit().unwrap();

    let raw = rusqlite::Connection::open(temp.path().join("ledger.db")).unwrap();
    let err = raw
        .execute("UPDATE \"audit__status\" SET value = 'FAILURE'", [])
        .unwrap_err();
    assert!(err.to_string().contains("append-only"));

    let stored: Vec<AuditEvent> = container.read_records(Direction::Forward, None).unwrap();
    assert_eq!(stored, vec![event]);
}

#[test]
fn test_concurrent_writers_keep_sections_aligned() {
    let (container, _temp) = setup();
    let num_threads = 8;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let writer = BufferedWriter::new(container, WriterConfig::new(7));
                barrier.wait();
                for i in 0..per_thread {
                    writer
                        .append(InteractionRecord::new(format!("t{}", t), format!("{}", i)))
                        .unwrap();
                }
                writer.close().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (num_threads * per_thread) as u64;
    assert!(section_lengths(&container, INTERACTIONS)
        .iter()
        .all(|&len| len == expected));

    // Each writer's records keep their relative order.
    let records: Vec<InteractionRecord> = container.read_records(Direction::Forward, None).unwrap();
    for t in 0..num_threads {
        let session = format!("t{}", t);
        let seq: Vec<usize> = records
            .iter()
            .filter(|r| r.session_id == session)
            .map(|r| r.transcript.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..per_thread).collect::<Vec<_>>());
    }
}

fn section_rows(container: &RecordContainer, section: &str) -> Vec<Row> {
    let mut rows = Vec::new();
    container
        .scan(section, Direction::Forward, |row| {
            rows.push(row);
            Ok(true)
        })
        .unwrap();
    rows
}

fn seeded(rows: usize) -> (Arc<RecordContainer>, TempDir) {
    let (container, temp) = setup();
    if rows > 0 {
        let batch: Vec<_> = (0..rows)
            .map(|i| InteractionRecord::new("s", format!("{}", i)).to_columns())
            .collect();
        let mut guard = container.begin_append().unwrap();
        guard.append_rows(INTERACTIONS, &batch).unwrap();
        guard.commit().unwrap();
    }
    (container, temp)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any sequence of flushes, good or bad, leaves columns growth-only and
    /// aligned, and never changes a row that was already committed.
    #[test]
    fn prop_committed_rows_never_change(batches in prop::collection::vec(
        prop::collection::vec((any::<bool>(), "[a-z]{0,12}"), 0..6), 1..8)
    ) {
        let (container, _temp) = setup();
        let mut previous_lengths = section_lengths(&container, INTERACTIONS);
        let mut previous_rows = section_rows(&container, INTERACTIONS);

        for batch in batches {
            let mut guard = container.begin_append().unwrap();
            let mut ok = true;
            for (good, text) in &batch {
                let result = if *good {
                    guard
                        .append_rows(INTERACTIONS, &[InteractionRecord::new("s", text.clone()).to_columns()])
                        .map(|_| ())
                } else {
                    guard.append_column(INTERACTIONS, "note", &[ColumnValue::Integer(1)]).map(|_| ())
                };
                if result.is_err() {
                    ok = false;
                    break;
                }
            }
            if ok {
                guard.commit().unwrap();
            } else {
                guard.abort();
            }

            let lengths = section_lengths(&container, INTERACTIONS);
            prop_assert!(lengths.windows(2).all(|w| w[0] == w[1]));
            prop_assert!(lengths[0] >= previous_lengths[0]);

            let rows = section_rows(&container, INTERACTIONS);
            prop_assert!(rows.len() >= previous_rows.len());
            prop_assert_eq!(&rows[..previous_rows.len()], &previous_rows[..]);

            previous_lengths = lengths;
            previous_rows = rows;
        }
    }

    /// Resizes below the current length and writes below the original length
    /// are refused; everything at or above is accepted.
    #[test]
    fn prop_guard_bounds(current in 0usize..40, new_size in 0u64..80) {
        let (container, _temp) = seeded(current);
        let current = current as u64;
        let guard = container.begin_append().unwrap();

        let resize = guard.validate_resize(INTERACTIONS, "transcript", new_size);
        if new_size < current {
            prop_assert!(matches!(resize, Err(LedgerError::AppendOnlyViolation(_))));
        } else {
            prop_assert!(resize.unwrap());
        }

        let write = guard.validate_write_index(INTERACTIONS, "transcript", new_size);
        if new_size < current {
            prop_assert!(matches!(write, Err(LedgerError::AppendOnlyViolation(_))));
        } else {
            prop_assert!(write.unwrap());
        }

        prop_assert!(guard.validate_write_index(INTERACTIONS, "transcript", current).unwrap());
        prop_assert!(guard.validate_resize(INTERACTIONS, "transcript", current).unwrap());
        if current > 0 {
            prop_assert!(guard.validate_write_index(INTERACTIONS, "transcript", current - 1).is_err());
            prop_assert!(guard.validate_resize(INTERACTIONS, "transcript", current - 1).is_err());
        }
    }
}
