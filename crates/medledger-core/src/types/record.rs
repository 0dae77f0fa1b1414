use crate::error::{LedgerError, Result};
use crate::hashing::{canonical_json, sha256_hex};
use crate::types::schema::{EMBEDDINGS, IDENTITY, INTERACTIONS, RETENTION};
use crate::types::time::{format_timestamp, now, parse_timestamp};
use crate::types::value::{ColumnValue, Row};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A logical record stored across the parallel columns of one section.
pub trait Record: Sized + Send {
    /// Section this record belongs to
    fn section() -> &'static str;

    /// Identifier returned to the caller when the record is buffered
    fn record_id(&self) -> &str;

    /// One value per column of the section
    fn to_columns(&self) -> Vec<(&'static str, ColumnValue)>;

    /// Rebuild the record from the values at one index
    fn from_row(row: &Row) -> Result<Self>;
}

/// A clinical interaction: transcript plus the generated note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub transcript: String,
    pub note: String,
    pub model_id: String,
    pub metadata: Value,
}

impl InteractionRecord {
    pub fn new(session_id: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            timestamp: now(),
            session_id: session_id.into(),
            transcript: transcript.into(),
            note: String::new(),
            model_id: String::new(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Record for InteractionRecord {
    fn section() -> &'static str {
        INTERACTIONS
    }

    fn record_id(&self) -> &str {
        &self.record_id
    }

    fn to_columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("record_id", self.record_id.clone().into()),
            ("timestamp", format_timestamp(&self.timestamp).into()),
            ("session_id", self.session_id.clone().into()),
            ("transcript", self.transcript.clone().into()),
            ("note", self.note.clone().into()),
            ("model_id", self.model_id.clone().into()),
            ("metadata", canonical_json(&self.metadata).into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            record_id: row.text("record_id")?.to_string(),
            timestamp: parse_timestamp(row.text("timestamp")?)?,
            session_id: row.text("session_id")?.to_string(),
            transcript: row.text("transcript")?.to_string(),
            note: row.text("note")?.to_string(),
            model_id: row.text("model_id")?.to_string(),
            metadata: serde_json::from_str(row.text("metadata")?)?,
        })
    }
}

/// Embedding vector attached to an interaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub record_id: String,
    pub vector: Vec<f32>,
    pub model: String,
}

impl EmbeddingRecord {
    pub fn new(record_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            record_id: record_id.into(),
            vector,
            model: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Record for EmbeddingRecord {
    fn section() -> &'static str {
        EMBEDDINGS
    }

    fn record_id(&self) -> &str {
        &self.record_id
    }

    fn to_columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("record_id", self.record_id.clone().into()),
            ("vector", ColumnValue::Vector(self.vector.clone())),
            ("model", self.model.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            record_id: row.text("record_id")?.to_string(),
            vector: row.vector("vector")?.to_vec(),
            model: row.text("model")?.to_string(),
        })
    }
}

/// Ownership proof of a container.
///
/// The owner identifier itself is never stored: only `sha256(salt:owner)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub user_uuid: String,
    pub owner_hash: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Generate a fresh identity with a random id and salt.
    pub fn generate(owner_identifier: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        Self {
            user_uuid: Uuid::new_v4().to_string(),
            owner_hash: Self::hash_owner(&salt, owner_identifier),
            salt,
            created_at: now(),
        }
    }

    fn hash_owner(salt: &str, owner_identifier: &str) -> String {
        sha256_hex(format!("{}:{}", salt, owner_identifier).as_bytes())
    }

    pub fn verify_owner(&self, owner_identifier: &str) -> bool {
        Self::hash_owner(&self.salt, owner_identifier) == self.owner_hash
    }
}

impl Record for IdentityRecord {
    fn section() -> &'static str {
        IDENTITY
    }

    fn record_id(&self) -> &str {
        &self.user_uuid
    }

    fn to_columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("user_uuid", self.user_uuid.clone().into()),
            ("owner_hash", self.owner_hash.clone().into()),
            ("salt", self.salt.clone().into()),
            ("created_at", format_timestamp(&self.created_at).into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            user_uuid: row.text("user_uuid")?.to_string(),
            owner_hash: row.text("owner_hash")?.to_string(),
            salt: row.text("salt")?.to_string(),
            created_at: parse_timestamp(row.text("created_at")?)?,
        })
    }
}

/// Trace of one sanctioned retention rebuild.
///
/// Written in the same transaction that drops the expired rows, so a verifier
/// can tell lawful pruning before `cutoff` from tampering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionMark {
    pub recorded_at: DateTime<Utc>,
    pub section: String,
    /// Rows timestamped before this instant were removed
    pub cutoff: DateTime<Utc>,
    pub removed: u64,
}

impl RetentionMark {
    pub fn new(section: impl Into<String>, cutoff: DateTime<Utc>, removed: u64) -> Self {
        Self {
            recorded_at: now(),
            section: section.into(),
            cutoff,
            removed,
        }
    }
}

impl Record for RetentionMark {
    fn section() -> &'static str {
        RETENTION
    }

    fn record_id(&self) -> &str {
        &self.section
    }

    fn to_columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("recorded_at", format_timestamp(&self.recorded_at).into()),
            ("section", self.section.clone().into()),
            ("cutoff", format_timestamp(&self.cutoff).into()),
            ("removed", ColumnValue::Integer(self.removed as i64)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let removed = match row.get("removed") {
            Some(ColumnValue::Integer(n)) => *n as u64,
            _ => {
                return Err(LedgerError::SchemaInvalid(
                    "retention.removed is not an integer".to_string(),
                ))
            }
        };
        Ok(Self {
            recorded_at: parse_timestamp(row.text("recorded_at")?)?,
            section: row.text("section")?.to_string(),
            cutoff: parse_timestamp(row.text("cutoff")?)?,
            removed,
        })
    }
}

#[cfg(test)]
pub(crate) fn to_row<R: Record>(index: u64, record: &R) -> Row {
    let mut row = Row::new(index);
    for (column, value) in record.to_columns() {
        row.insert(column, value);
    }
    row
}
