//! End-to-end behaviour of the ledger: record counts, audit retrieval,
//! retention and manifest chain tamper detection.

use chrono::{Duration, NaiveDate, Utc};
use medledger::prelude::*;
use medledger::ChainErrorKind;
use tempfile::TempDir;

fn setup() -> (Ledger, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig::new(temp_dir.path()).with_embedding_dim(4);
    let ledger = Ledger::initialize(config, "dr.alvarez@clinic.example", false).unwrap();
    (ledger, temp_dir)
}

fn audit_event_on(date: NaiveDate, operation: &str) -> AuditEvent {
    AuditEvent::new(
        operation,
        "dr-alvarez",
        "/interactions/1",
        &Payload::from(operation),
        &Payload::from("ok"),
        AuditStatus::Success,
    )
    .with_timestamp(date.and_hms_opt(9, 30, 0).unwrap().and_utc())
}

#[test]
fn test_records_and_embedding_counts() {
    let (ledger, _temp) = setup();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            ledger
                .append_interaction(InteractionRecord::new("session-1", format!("turn {}", i)))
                .unwrap(),
        );
    }
    assert!(ledger.append_embedding(&ids[2], vec![0.1, 0.2, 0.3, 0.4]).unwrap());
    ledger.flush().unwrap();

    let stats = ledger.get_stats().unwrap();
    assert_eq!(stats.records, 5);
    assert_eq!(stats.embeddings, 1);
    assert_eq!(stats.audit_events, 0);
}

#[test]
fn test_latest_audit_event_returned() {
    let (ledger, _temp) = setup();
    let id = ledger
        .audit()
        .append_audit_log(
            "TEST_OP",
            "tester",
            "/test",
            &serde_json::json!({"k": "v"}).into(),
            &Payload::Null,
            AuditStatus::Success,
            None,
        )
        .unwrap();

    let events = ledger.audit().get_audit_logs(1, None, None).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, id);
    assert_eq!(events[0].operation, "TEST_OP");
    assert_eq!(events[0].status, AuditStatus::Success);
    assert_eq!(events[0].payload_hash.len(), 64);
    assert!(events[0].payload_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_best_effort_swallows_failures() {
    let (ledger, _temp) = setup();
    assert!(ledger
        .audit()
        .record_best_effort("OK", "a", "/r", &Payload::Null, &Payload::Null, AuditStatus::Success, None)
        .is_some());

    // Make the audit section unwritable underneath the ledger.
    let raw = rusqlite::Connection::open(ledger.container().path()).unwrap();
    raw.execute_batch("DROP TABLE \"audit__status\"").unwrap();

    assert!(ledger
        .audit()
        .record_best_effort("LOST", "a", "/r", &Payload::Null, &Payload::Null, AuditStatus::Error, None)
        .is_none());
}

#[test]
fn test_retention_cleanup_and_dry_run() {
    let (ledger, _temp) = setup();
    let today = Utc::now().date_naive();
    ledger
        .audit()
        .append_event(audit_event_on(today - Duration::days(100), "OLD"))
        .unwrap();
    ledger
        .audit()
        .append_event(AuditEvent::new("NEW", "a", "/r", &Payload::Null, &Payload::Null, AuditStatus::Success))
        .unwrap();

    for _ in 0..3 {
        let dry = ledger.audit().cleanup_old_logs(90, true).unwrap();
        assert_eq!(dry.would_delete, 1);
        assert_eq!(dry.deleted, 0);
        assert_eq!(ledger.get_stats().unwrap().audit_events, 2);
    }

    let result = ledger.audit().cleanup_old_logs(90, false).unwrap();
    assert_eq!((result.deleted, result.kept), (1, 1));

    let remaining = ledger.audit().get_audit_logs(10, None, None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].operation, "NEW");
}

#[test]
fn test_chain_round_trip_and_tamper_detection() {
    let (ledger, _temp) = setup();
    let today = Utc::now().date_naive();
    let days: Vec<NaiveDate> = (1..=5).rev().map(|n| today - Duration::days(n)).collect();

    for (i, date) in days.iter().enumerate() {
        for j in 0..=i {
            ledger
                .audit()
                .append_event(audit_event_on(*date, &format!("OP_{}_{}", i, j)))
                .unwrap();
        }
    }
    for date in &days {
        ledger.manifests().create_daily_manifest(Some(*date)).unwrap();
    }

    let report = ledger.manifests().verify_manifest_chain(None, None).unwrap();
    assert!(report.valid, "{:?}", report.errors);
    assert_eq!(report.manifests_checked, 5);
    assert!(report.errors.is_empty());

    // Rewrite one stored event of the third day behind the ledger's back.
    let target = ledger.audit().events_on(days[2]).unwrap()[1].event_id.clone();
    let raw = rusqlite::Connection::open(ledger.container().path()).unwrap();
    raw.execute_batch("DROP TRIGGER \"audit__actor_id__no_update\"").unwrap();
    let changed = raw
        .execute(
            "UPDATE \"audit__actor_id\" SET value = 'intruder'
             WHERE idx = (SELECT idx FROM \"audit__event_id\" WHERE value = ?1)",
            [&target],
        )
        .unwrap();
    assert_eq!(changed, 1);

    let report = ledger.manifests().verify_manifest_chain(None, None).unwrap();
    assert!(!report.valid);
    assert_eq!(report.manifests_checked, 5);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].date, Some(days[2]));
    assert!(matches!(
        report.errors[0].kind,
        ChainErrorKind::AccessLogHashMismatch { .. }
    ));
}

#[test]
fn test_retention_pruning_is_not_tampering() {
    let (ledger, _temp) = setup();
    let today = Utc::now().date_naive();
    let old_day = today - Duration::days(120);
    let recent_day = today - Duration::days(1);

    ledger.audit().append_event(audit_event_on(old_day, "OLD")).unwrap();
    ledger.audit().append_event(audit_event_on(recent_day, "RECENT")).unwrap();
    ledger.manifests().create_daily_manifest(Some(old_day)).unwrap();
    ledger.manifests().create_daily_manifest(Some(recent_day)).unwrap();

    ledger.audit().cleanup_old_logs(90, false).unwrap();

    let report = ledger.manifests().verify_manifest_chain(None, None).unwrap();
    assert!(report.valid, "{:?}", report.errors);
    assert_eq!(report.pruned_dates, vec![old_day]);
}

#[test]
fn test_manifest_tamper_detected() {
    let (ledger, temp) = setup();
    let today = Utc::now().date_naive();
    for n in (1..=3).rev() {
        ledger
            .manifests()
            .create_daily_manifest(Some(today - Duration::days(n)))
            .unwrap();
    }

    let raw = rusqlite::Connection::open(temp.path().join("manifests.db")).unwrap();
    raw.execute_batch(
        "DROP TRIGGER daily_manifests_no_update;
         UPDATE daily_manifests SET event_count = 7 WHERE date = (SELECT MIN(date) FROM daily_manifests);",
    )
    .unwrap();

    let report = ledger.manifests().verify_manifest_chain(None, None).unwrap();
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| matches!(
        e.kind,
        ChainErrorKind::ManifestHashMismatch { .. }
    )));
}

#[test]
fn test_undecodable_rows_are_reported_not_raised() {
    let (ledger, temp) = setup();
    let today = Utc::now().date_naive();
    let days: Vec<NaiveDate> = (1..=3).rev().map(|n| today - Duration::days(n)).collect();
    for date in &days {
        ledger.audit().append_event(audit_event_on(*date, "READ")).unwrap();
        ledger.manifests().create_daily_manifest(Some(*date)).unwrap();
    }

    let raw = rusqlite::Connection::open(ledger.container().path()).unwrap();
    raw.execute_batch(
        "DROP TRIGGER \"audit__status__no_update\";
         DROP TRIGGER \"audit__timestamp__no_update\";
         UPDATE \"audit__status\" SET value = 'TAMPERED' WHERE idx = 0;
         UPDATE \"audit__timestamp\" SET value = 'sometime' WHERE idx = 2;",
    )
    .unwrap();
    let manifests = rusqlite::Connection::open(temp.path().join("manifests.db")).unwrap();
    manifests
        .execute_batch("DROP TRIGGER daily_manifests_no_update;")
        .unwrap();
    manifests
        .execute(
            "UPDATE daily_manifests SET created_at = 'whenever' WHERE date = ?1",
            [days[1].format("%Y-%m-%d").to_string()],
        )
        .unwrap();

    let report = ledger.manifests().verify_manifest_chain(None, None).unwrap();
    assert!(!report.valid);
    assert_eq!(report.manifests_checked, 3);

    let has = |date: Option<NaiveDate>, pred: fn(&ChainErrorKind) -> bool| {
        report.errors.iter().any(|e| e.date == date && pred(&e.kind))
    };
    assert!(has(Some(days[0]), |k| matches!(k, ChainErrorKind::AccessLogHashMismatch { .. })));
    assert!(has(Some(days[1]), |k| matches!(k, ChainErrorKind::UnreadableManifest { .. })));
    assert!(has(Some(days[2]), |k| matches!(
        k,
        ChainErrorKind::EventCountMismatch { stored: 1, computed: 0 }
    )));
    assert!(has(None, |k| matches!(k, ChainErrorKind::UnreadableEvent { index: 2, .. })));
}
