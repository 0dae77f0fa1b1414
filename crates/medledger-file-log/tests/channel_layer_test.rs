use chrono::{NaiveDate, Utc};
use medledger_core::{ChannelLogConfig, LogChannel};
use medledger_file_log::{ChannelLayer, ChannelLogs};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;

fn setup() -> (Arc<ChannelLogs>, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let logs = ChannelLogs::open(ChannelLogConfig::new(temp_dir.path().to_path_buf())).unwrap();
    (Arc::new(logs), temp_dir)
}

fn read_lines(logs: &ChannelLogs, channel: LogChannel) -> Vec<serde_json::Value> {
    let path = logs.log_path(channel, Utc::now().date_naive());
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_events_routed_by_target() {
    let (logs, _temp) = setup();
    let subscriber = tracing_subscriber::registry().with(ChannelLayer::new(logs.clone()));

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(target: "medledger::access", actor = "dr-1", "read record");
        tracing::warn!(target: "medledger::storage::flush", records = 3u64, "slow flush");
        tracing::info!(target: "somewhere_else", "ignored");
    });

    let access = read_lines(&logs, LogChannel::Access);
    assert_eq!(access.len(), 1);
    assert_eq!(access[0]["message"], "read record");
    assert_eq!(access[0]["level"], "INFO");
    assert_eq!(access[0]["fields"]["actor"], "dr-1");

    let storage = read_lines(&logs, LogChannel::Storage);
    assert_eq!(storage.len(), 1);
    assert_eq!(storage[0]["fields"]["records"], 3);
    assert_eq!(storage[0]["target"], "medledger::storage::flush");

    assert!(read_lines(&logs, LogChannel::Request).is_empty());
}

fn seed_rotated(logs: &ChannelLogs, channel: LogChannel, date: NaiveDate) -> std::path::PathBuf {
    let path = logs
        .config()
        .channel_dir(channel)
        .join(format!("{}-{}.log.gz", channel.name(), date.format("%Y-%m-%d")));
    std::fs::write(&path, b"gz").unwrap();
    path
}

#[test]
fn test_operational_logs_deleted_after_retention() {
    let (logs, _temp) = setup();
    let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    let old = seed_rotated(&logs, LogChannel::Request, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
    let recent = seed_rotated(&logs, LogChannel::Request, NaiveDate::from_ymd_opt(2026, 5, 25).unwrap());

    let report = logs.cleanup_old_logs_as_of(LogChannel::Request, today).unwrap();
    assert_eq!(report.deleted, vec![old.clone()]);
    assert!(report.archived.is_empty());
    assert!(!old.exists());
    assert!(recent.exists());
}

#[test]
fn test_access_logs_archived_never_deleted() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = ChannelLogConfig::new(temp_dir.path().to_path_buf())
        .with_retention_days(LogChannel::Access, 10);
    let logs = ChannelLogs::open(config).unwrap();

    let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    let old = seed_rotated(&logs, LogChannel::Access, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());

    let report = logs.cleanup_old_logs_as_of(LogChannel::Access, today).unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.archived.len(), 1);
    assert!(!old.exists());
    assert!(report.archived[0].exists());
    assert!(report.archived[0].starts_with(temp_dir.path().join("archive").join("access")));
}
