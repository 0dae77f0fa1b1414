use crate::error::{LedgerError, Result};
use crate::hashing::{canonical_json, hash_payload, sha256_hex, Payload};
use crate::types::record::Record;
use crate::types::schema::AUDIT;
use crate::types::time::{format_timestamp, now, parse_timestamp};
use crate::types::value::{ColumnValue, Row};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Outcome of an audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
    Denied,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
            AuditStatus::Denied => "DENIED",
            AuditStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILURE" => Ok(AuditStatus::Failure),
            "DENIED" => Ok(AuditStatus::Denied),
            "ERROR" => Ok(AuditStatus::Error),
            other => Err(LedgerError::SchemaInvalid(format!(
                "Unknown audit status '{}'",
                other
            ))),
        }
    }
}

/// One row of the audit trail.
///
/// Request and response bodies are never stored; only their content hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub actor_id: String,
    pub resource_path: String,
    pub payload_hash: String,
    pub result_hash: String,
    pub status: AuditStatus,
    pub metadata: Value,
}

impl AuditEvent {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(
        operation: impl Into<String>,
        actor_id: impl Into<String>,
        resource_path: impl Into<String>,
        payload: &Payload,
        result: &Payload,
        status: AuditStatus,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: now(),
            operation: operation.into(),
            actor_id: actor_id.into(),
            resource_path: resource_path.into(),
            payload_hash: hash_payload(payload),
            result_hash: hash_payload(result),
            status,
            metadata: Value::Object(Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the timestamp. Used when importing historical events.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// SHA-256 over the canonical JSON of every stored field.
    ///
    /// A manifest folds these per-event hashes into its `access_log_hash`, so
    /// any edit to any stored column changes the day's hash.
    pub fn content_hash(&self) -> String {
        let columns = self.to_columns();
        hash_text_columns(columns.iter().map(|(column, value)| (*column, value)))
    }

    /// [`AuditEvent::content_hash`] of a stored row, taken from the raw column
    /// values so that rows which no longer decode can still be hashed.
    pub fn row_content_hash(row: &Row) -> String {
        hash_text_columns(row.columns().map(|(column, value)| (column.as_str(), value)))
    }

    /// UTC day a stored row belongs to
    pub fn row_date(row: &Row) -> Result<NaiveDate> {
        Ok(parse_timestamp(row.text("timestamp")?)?.date_naive())
    }
}

fn hash_text_columns<'a>(columns: impl Iterator<Item = (&'a str, &'a ColumnValue)>) -> String {
    let object: Map<String, Value> = columns
        .filter_map(|(column, value)| match value {
            ColumnValue::Text(text) => Some((column.to_string(), Value::String(text.clone()))),
            _ => None,
        })
        .collect();
    sha256_hex(canonical_json(&Value::Object(object)).as_bytes())
}

impl Record for AuditEvent {
    fn section() -> &'static str {
        AUDIT
    }

    fn record_id(&self) -> &str {
        &self.event_id
    }

    fn to_columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("event_id", self.event_id.clone().into()),
            ("timestamp", format_timestamp(&self.timestamp).into()),
            ("operation", self.operation.clone().into()),
            ("actor_id", self.actor_id.clone().into()),
            ("resource_path", self.resource_path.clone().into()),
            ("payload_hash", self.payload_hash.clone().into()),
            ("result_hash", self.result_hash.clone().into()),
            ("status", self.status.as_str().into()),
            ("metadata", canonical_json(&self.metadata).into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            event_id: row.text("event_id")?.to_string(),
            timestamp: parse_timestamp(row.text("timestamp")?)?,
            operation: row.text("operation")?.to_string(),
            actor_id: row.text("actor_id")?.to_string(),
            resource_path: row.text("resource_path")?.to_string(),
            payload_hash: row.text("payload_hash")?.to_string(),
            result_hash: row.text("result_hash")?.to_string(),
            status: row.text("status")?.parse()?,
            metadata: serde_json::from_str(row.text("metadata")?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::to_row;
    use serde_json::json;

    fn sample() -> AuditEvent {
        AuditEvent::new(
            "NOTE_GENERATE",
            "clinician-42",
            "/interactions/abc",
            &json!({"session": "s1"}).into(),
            &Payload::from("ok"),
            AuditStatus::Success,
        )
        .with_metadata(json!({"ip": "10.0.0.8"}))
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("success".parse::<AuditStatus>().unwrap(), AuditStatus::Success);
        assert_eq!("DENIED".parse::<AuditStatus>().unwrap(), AuditStatus::Denied);
        assert!("MAYBE".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn test_content_hash_survives_storage() {
        let event = sample();
        let restored = AuditEvent::from_row(&to_row(0, &event)).unwrap();
        assert_eq!(restored, event);
        assert_eq!(restored.content_hash(), event.content_hash());
    }

    #[test]
    fn test_content_hash_covers_every_field() {
        let event = sample();
        let mut tampered = event.clone();
        tampered.actor_id = "intruder".into();
        assert_ne!(event.content_hash(), tampered.content_hash());

        let mut tampered = event.clone();
        tampered.status = AuditStatus::Failure;
        assert_ne!(event.content_hash(), tampered.content_hash());
    }

    #[test]
    fn test_hashes_are_hex() {
        let event = sample();
        assert_eq!(event.payload_hash.len(), 64);
        assert_eq!(event.result_hash.len(), 64);
        assert_eq!(event.content_hash().len(), 64);
    }

    #[test]
    fn test_row_hash_matches_event_hash() {
        let event = sample();
        let mut row = to_row(7, &event);
        assert_eq!(AuditEvent::row_content_hash(&row), event.content_hash());
        assert_eq!(AuditEvent::row_date(&row).unwrap(), event.timestamp.date_naive());

        // A status that no longer decodes still hashes, just differently
        row.insert("status", ColumnValue::Text("TAMPERED".to_string()));
        assert!(AuditEvent::from_row(&row).is_err());
        assert_ne!(AuditEvent::row_content_hash(&row), event.content_hash());
    }
}
