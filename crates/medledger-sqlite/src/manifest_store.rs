//! Write-once store for the daily manifest chain.
//!
//! Manifests live in their own SQLite file next to the container, one row per
//! date. Rows are never updated or deleted; triggers enforce that at the
//! storage level, like the container's column tables.

use crate::sql_err;
use chrono::{Duration, NaiveDate};
use medledger_core::types::time::{format_timestamp, parse_timestamp};
use medledger_core::{DailyManifest, LedgerError, Result};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct ManifestStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl ManifestStore {
    /// Open the store, creating the file and table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| LedgerError::Config(e.to_string()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS daily_manifests (
                date TEXT PRIMARY KEY,
                access_log_hash TEXT NOT NULL,
                event_count INTEGER NOT NULL,
                previous_manifest_hash TEXT,
                manifest_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TRIGGER IF NOT EXISTS daily_manifests_no_update
                BEFORE UPDATE ON daily_manifests
                BEGIN SELECT RAISE(ABORT, 'append-only: manifests are write-once'); END;
            CREATE TRIGGER IF NOT EXISTS daily_manifests_no_delete
                BEFORE DELETE ON daily_manifests
                BEGIN SELECT RAISE(ABORT, 'append-only: manifests are write-once'); END;",
        )
        .map_err(sql_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a manifest. Fails with `ManifestExists` if its date is taken.
    pub fn insert(&self, manifest: &DailyManifest) -> Result<()> {
        let conn = self.conn.lock();
        let date = manifest.date.format(DATE_FORMAT).to_string();
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM daily_manifests WHERE date = ?1",
                [&date],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        if taken.is_some() {
            return Err(LedgerError::ManifestExists(manifest.date));
        }

        conn.execute(
            "INSERT INTO daily_manifests
                (date, access_log_hash, event_count, previous_manifest_hash, manifest_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                date,
                manifest.access_log_hash,
                manifest.event_count as i64,
                manifest.previous_manifest_hash,
                manifest.manifest_hash,
                format_timestamp(&manifest.created_at),
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<DailyManifest>> {
        self.query_one(
            "SELECT date, access_log_hash, event_count, previous_manifest_hash, manifest_hash, created_at
             FROM daily_manifests WHERE date = ?1",
            &[&date.format(DATE_FORMAT).to_string()],
        )
    }

    /// The most recent manifest strictly before `date` and no more than
    /// `lookback_days` before it.
    pub fn latest_before(&self, date: NaiveDate, lookback_days: u32) -> Result<Option<DailyManifest>> {
        let floor = date - Duration::days(i64::from(lookback_days));
        self.query_one(
            "SELECT date, access_log_hash, event_count, previous_manifest_hash, manifest_hash, created_at
             FROM daily_manifests WHERE date < ?1 AND date >= ?2
             ORDER BY date DESC LIMIT 1",
            &[
                &date.format(DATE_FORMAT).to_string(),
                &floor.format(DATE_FORMAT).to_string(),
            ],
        )
    }

    /// The manifest with the latest date
    pub fn latest(&self) -> Result<Option<DailyManifest>> {
        self.query_one(
            "SELECT date, access_log_hash, event_count, previous_manifest_hash, manifest_hash, created_at
             FROM daily_manifests ORDER BY date DESC LIMIT 1",
            &[],
        )
    }

    /// Whether any manifest exists before `date`, however old
    pub fn any_before(&self, date: NaiveDate) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM daily_manifests WHERE date < ?1",
                [date.format(DATE_FORMAT).to_string()],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        Ok(count > 0)
    }

    /// Manifests within the inclusive range, oldest first. Open bounds are unbounded.
    pub fn list(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<DailyManifest>> {
        self.list_stored(start, end)?
            .into_iter()
            .map(|stored| stored.manifest)
            .collect()
    }

    /// Every row in the inclusive date range, each decoded on its own so an
    /// unreadable row does not hide the others.
    pub fn list_stored(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<StoredManifest>> {
        let start = start.map_or_else(|| "0000-01-01".to_string(), |d| d.format(DATE_FORMAT).to_string());
        let end = end.map_or_else(|| "9999-12-31".to_string(), |d| d.format(DATE_FORMAT).to_string());

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT date, access_log_hash, event_count, previous_manifest_hash, manifest_hash, created_at
                 FROM daily_manifests WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![start, end], raw_manifest)
            .map_err(sql_err)?;

        let mut stored = Vec::new();
        for row in rows {
            let raw = row.map_err(sql_err)?;
            stored.push(StoredManifest {
                date: match &raw[0] {
                    Value::Text(text) => NaiveDate::parse_from_str(text, DATE_FORMAT).ok(),
                    _ => None,
                },
                manifest: decode(raw),
            });
        }
        Ok(stored)
    }

    /// `manifest_hash` of the latest manifest strictly before `date` and no
    /// more than `lookback_days` before it, read without decoding the row.
    pub fn latest_hash_before(&self, date: NaiveDate, lookback_days: u32) -> Result<Option<String>> {
        let floor = date - Duration::days(i64::from(lookback_days));
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT CAST(manifest_hash AS TEXT) FROM daily_manifests
             WHERE date < ?1 AND date >= ?2 ORDER BY date DESC LIMIT 1",
            params![
                date.format(DATE_FORMAT).to_string(),
                floor.format(DATE_FORMAT).to_string()
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM daily_manifests", [], |row| row.get(0))
            .map_err(sql_err)?;
        Ok(count as u64)
    }

    fn query_one(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<DailyManifest>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(sql, args, raw_manifest)
            .optional()
            .map_err(sql_err)?;
        raw.map(decode).transpose()
    }
}

/// A manifest row as read from disk. `date` is `None` when the key itself
/// does not parse.
#[derive(Debug)]
pub struct StoredManifest {
    pub date: Option<NaiveDate>,
    pub manifest: Result<DailyManifest>,
}

type RawManifest = [Value; 6];

fn raw_manifest(row: &Row<'_>) -> rusqlite::Result<RawManifest> {
    Ok([
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ])
}

fn text(value: Value, column: &str) -> Result<String> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(LedgerError::SchemaInvalid(format!(
            "manifest {} is not text: {:?}",
            column, other
        ))),
    }
}

fn decode(raw: RawManifest) -> Result<DailyManifest> {
    let [date, access_log_hash, event_count, previous_manifest_hash, manifest_hash, created_at] = raw;
    let date = text(date, "date")?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| LedgerError::SchemaInvalid(format!("manifest date '{}': {}", date, e)))?;
    let event_count = match event_count {
        Value::Integer(n) if n >= 0 => n as u64,
        other => {
            return Err(LedgerError::SchemaInvalid(format!(
                "manifest event_count is not a count: {:?}",
                other
            )))
        }
    };
    let previous_manifest_hash = match previous_manifest_hash {
        Value::Null => None,
        other => Some(text(other, "previous_manifest_hash")?),
    };
    Ok(DailyManifest {
        date,
        access_log_hash: text(access_log_hash, "access_log_hash")?,
        event_count,
        previous_manifest_hash,
        manifest_hash: text(manifest_hash, "manifest_hash")?,
        created_at: parse_timestamp(&text(created_at, "created_at")?)?,
    })
}
