use crate::hashing::{canonical_json, sha256_hex};
use crate::types::time::format_timestamp;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One link of the daily manifest chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyManifest {
    pub date: NaiveDate,

    /// SHA-256 over the concatenated content hashes of the day's audit events
    pub access_log_hash: String,

    pub event_count: u64,

    /// `manifest_hash` of the previous link; `None` only at a segment start
    pub previous_manifest_hash: Option<String>,

    /// SHA-256 over the canonical form of all the fields above plus `created_at`
    pub manifest_hash: String,

    pub created_at: DateTime<Utc>,
}

impl DailyManifest {
    pub fn new(
        date: NaiveDate,
        access_log_hash: String,
        event_count: u64,
        previous_manifest_hash: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let manifest_hash = Self::compute_hash(
            &date,
            &access_log_hash,
            event_count,
            previous_manifest_hash.as_deref(),
            &created_at,
        );
        Self {
            date,
            access_log_hash,
            event_count,
            previous_manifest_hash,
            manifest_hash,
            created_at,
        }
    }

    pub fn compute_hash(
        date: &NaiveDate,
        access_log_hash: &str,
        event_count: u64,
        previous_manifest_hash: Option<&str>,
        created_at: &DateTime<Utc>,
    ) -> String {
        let canonical = canonical_json(&json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "access_log_hash": access_log_hash,
            "event_count": event_count,
            "previous_manifest_hash": previous_manifest_hash,
            "created_at": format_timestamp(created_at),
        }));
        sha256_hex(canonical.as_bytes())
    }

    /// Recompute the hash from the stored fields.
    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(
            &self.date,
            &self.access_log_hash,
            self.event_count,
            self.previous_manifest_hash.as_deref(),
            &self.created_at,
        )
    }

    /// Fold per-event content hashes into a day's `access_log_hash`.
    ///
    /// Zero events hash the empty string.
    pub fn fold_event_hashes<'a, I>(event_hashes: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let concatenated: String = event_hashes.into_iter().collect();
        sha256_hex(concatenated.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time::now;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_hash_is_reproducible() {
        let m = DailyManifest::new(day(1), "aa".into(), 2, None, now());
        assert_eq!(m.recompute_hash(), m.manifest_hash);
    }

    #[test]
    fn test_hash_binds_previous_link() {
        let created = now();
        let a = DailyManifest::new(day(2), "aa".into(), 2, None, created);
        let b = DailyManifest::new(day(2), "aa".into(), 2, Some("ff".into()), created);
        assert_ne!(a.manifest_hash, b.manifest_hash);

        let mut tampered = b.clone();
        tampered.event_count = 3;
        assert_ne!(tampered.recompute_hash(), tampered.manifest_hash);
    }

    #[test]
    fn test_empty_day_hashes_empty_string() {
        assert_eq!(
            DailyManifest::fold_event_hashes(std::iter::empty()),
            sha256_hex(b"")
        );
        assert_eq!(
            DailyManifest::fold_event_hashes(["ab", "cd"]),
            sha256_hex(b"abcd")
        );
    }
}
