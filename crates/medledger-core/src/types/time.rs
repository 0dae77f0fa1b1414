//! Timestamp formatting shared by every stored column.
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision in UTC.
//! Values are truncated to microseconds before use so that an event hashes the
//! same before it is written and after it is read back.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time truncated to storage precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::SchemaInvalid(format!("Bad timestamp '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_value() {
        let ts = now();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
